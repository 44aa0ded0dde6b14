// =============================================================================
// Instrument table — tick sizes, tick values, and per-symbol tuning
// =============================================================================

use crate::types::Price;

/// Static description of a futures instrument family.
#[derive(Debug, Clone, Copy)]
pub struct SymbolSpec {
    /// Contract root, e.g. "MES".
    pub root: &'static str,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Dollar value of one tick for one contract.
    pub tick_value: f64,
}

/// Per-symbol detector tuning.
#[derive(Debug, Clone, Copy)]
pub struct SymbolProfile {
    pub root: &'static str,
    pub imbalance_min_volume: u64,
    pub absorption_min_volume: u64,
    pub typical_bar_volume: u64,
    pub stop_ticks: i64,
    pub target_ticks: i64,
}

const SPECS: &[SymbolSpec] = &[
    SymbolSpec { root: "ES", tick_size: 0.25, tick_value: 12.50 },
    SymbolSpec { root: "MES", tick_size: 0.25, tick_value: 1.25 },
    SymbolSpec { root: "NQ", tick_size: 0.25, tick_value: 5.00 },
    SymbolSpec { root: "MNQ", tick_size: 0.25, tick_value: 0.50 },
    SymbolSpec { root: "CL", tick_size: 0.01, tick_value: 10.00 },
    SymbolSpec { root: "GC", tick_size: 0.10, tick_value: 10.00 },
    SymbolSpec { root: "SI", tick_size: 0.005, tick_value: 25.00 },
    SymbolSpec { root: "RTY", tick_size: 0.10, tick_value: 5.00 },
    SymbolSpec { root: "M2K", tick_size: 0.10, tick_value: 0.50 },
    SymbolSpec { root: "YM", tick_size: 1.0, tick_value: 5.00 },
    SymbolSpec { root: "MYM", tick_size: 1.0, tick_value: 0.50 },
];

const PROFILES: &[SymbolProfile] = &[
    SymbolProfile {
        root: "ES",
        imbalance_min_volume: 20,
        absorption_min_volume: 150,
        typical_bar_volume: 5000,
        stop_ticks: 16,
        target_ticks: 24,
    },
    SymbolProfile {
        root: "MES",
        imbalance_min_volume: 5,
        absorption_min_volume: 30,
        typical_bar_volume: 500,
        stop_ticks: 16,
        target_ticks: 24,
    },
    SymbolProfile {
        root: "NQ",
        imbalance_min_volume: 15,
        absorption_min_volume: 100,
        typical_bar_volume: 3000,
        stop_ticks: 20,
        target_ticks: 32,
    },
    SymbolProfile {
        root: "MNQ",
        imbalance_min_volume: 5,
        absorption_min_volume: 25,
        typical_bar_volume: 300,
        stop_ticks: 20,
        target_ticks: 32,
    },
    SymbolProfile {
        root: "CL",
        imbalance_min_volume: 30,
        absorption_min_volume: 200,
        typical_bar_volume: 8000,
        stop_ticks: 20,
        target_ticks: 30,
    },
    SymbolProfile {
        root: "GC",
        imbalance_min_volume: 15,
        absorption_min_volume: 100,
        typical_bar_volume: 2000,
        stop_ticks: 20,
        target_ticks: 30,
    },
];

/// Resolve a contract symbol (e.g. "MESZ5") to its instrument family.
///
/// Tries the 3-char root first (MES, MNQ, ...), then 2-char (ES, NQ, CL, ...),
/// falling back to MES, the system's default trading instrument.
pub fn spec_for(symbol: &str) -> SymbolSpec {
    lookup(symbol, SPECS, |s| s.root).unwrap_or(SPECS[1])
}

/// Detector tuning for a symbol, falling back to the MES profile.
pub fn profile_for(symbol: &str) -> SymbolProfile {
    lookup(symbol, PROFILES, |p| p.root).unwrap_or(PROFILES[1])
}

/// True when the symbol resolves to a known instrument family rather than
/// the fallback.
pub fn is_known(symbol: &str) -> bool {
    lookup(symbol, SPECS, |s| s.root).is_some()
}

fn lookup<T: Copy>(symbol: &str, table: &[T], root: impl Fn(&T) -> &'static str) -> Option<T> {
    let prefix3 = symbol.get(..3);
    let prefix2 = symbol.get(..2);
    if let Some(p3) = prefix3 {
        if let Some(t) = table.iter().find(|t| root(t) == p3) {
            return Some(*t);
        }
    }
    if let Some(p2) = prefix2 {
        if let Some(t) = table.iter().find(|t| root(t) == p2) {
            return Some(*t);
        }
    }
    None
}

/// Snap a raw decimal price onto the symbol's tick grid.
pub fn normalize(raw: f64, symbol: &str) -> Price {
    Price::from_points(raw, spec_for(symbol).tick_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_char_root_wins_over_two() {
        // "MES..." must resolve to MES ($1.25/tick), not ES ($12.50/tick).
        let spec = spec_for("MESZ5");
        assert_eq!(spec.root, "MES");
        assert!((spec.tick_value - 1.25).abs() < f64::EPSILON);

        let es = spec_for("ESZ5");
        assert_eq!(es.root, "ES");
        assert!((es.tick_value - 12.50).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_symbol_falls_back_to_mes() {
        let spec = spec_for("ZB");
        assert_eq!(spec.root, "MES");
        assert!(!is_known("ZB"));
        assert!(is_known("NQH6"));
    }

    #[test]
    fn normalize_rounds_to_tick() {
        // ES ticks in quarters.
        assert!((normalize(5000.13, "ES").to_points(0.25) - 5000.25).abs() < 1e-9);
        assert!((normalize(5000.12, "ES").to_points(0.25) - 5000.00).abs() < 1e-9);
        // CL ticks in pennies.
        assert!((normalize(78.123, "CL").to_points(0.01) - 78.12).abs() < 1e-9);
    }

    #[test]
    fn profile_lookup() {
        assert_eq!(profile_for("ES").imbalance_min_volume, 20);
        assert_eq!(profile_for("MNQU5").stop_ticks, 20);
        // Unknown symbols get the MES tuning.
        assert_eq!(profile_for("XX").absorption_min_volume, 30);
    }
}
