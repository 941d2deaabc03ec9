//! Material classifier
//!
//! Decides whether a material counts toward binder mass. CEMENT is always
//! binder. SCM counts only when its subtype resolves to a reactive material
//! in [`SYNONYMS`]. Any subtype naming limestone is an inert filler whatever
//! else it matches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse material taxonomy as stored in `material_classes`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialClass {
    Cement,
    Scm,
    Water,
    CoarseAggregate,
    FineAggregate,
    Admixture,
    Fiber,
    Other(String),
}

impl MaterialClass {
    /// Parse a class code, case-insensitive
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "CEMENT" => MaterialClass::Cement,
            "SCM" => MaterialClass::Scm,
            "WATER" => MaterialClass::Water,
            "AGGR_C" => MaterialClass::CoarseAggregate,
            "AGGR_F" => MaterialClass::FineAggregate,
            "ADM" => MaterialClass::Admixture,
            "FIBER" => MaterialClass::Fiber,
            other => MaterialClass::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            MaterialClass::Cement => "CEMENT",
            MaterialClass::Scm => "SCM",
            MaterialClass::Water => "WATER",
            MaterialClass::CoarseAggregate => "AGGR_C",
            MaterialClass::FineAggregate => "AGGR_F",
            MaterialClass::Admixture => "ADM",
            MaterialClass::Fiber => "FIBER",
            MaterialClass::Other(code) => code.as_str(),
        }
    }

    /// True for the seven reference classes
    pub fn is_known(&self) -> bool {
        !matches!(self, MaterialClass::Other(_))
    }
}

impl fmt::Display for MaterialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Canonical identity of a reactive supplementary cementitious material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactiveScm {
    FlyAsh,
    SilicaFume,
    Slag,
    NaturalPozzolan,
    Metakaolin,
}

/// Binder role of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cementitious {
    Cement,
    ReactiveScm(ReactiveScm),
    InertFiller,
    Other,
}

impl Cementitious {
    /// Whether the material contributes to binder mass
    pub fn is_cementitious(&self) -> bool {
        matches!(self, Cementitious::Cement | Cementitious::ReactiveScm(_))
    }
}

/// Alias set for one canonical material
pub struct SynonymEntry {
    pub material: ReactiveScm,
    /// Short codes matched against the whole normalized subtype
    pub codes: &'static [&'static str],
    /// Longer names matched as substrings of the normalized subtype
    pub names: &'static [&'static str],
}

/// The one synonym table used by every binder calculation
pub const SYNONYMS: &[SynonymEntry] = &[
    SynonymEntry {
        material: ReactiveScm::FlyAsh,
        codes: &["fa", "cfa", "pfa", "ffa"],
        names: &["fly ash", "flyash", "pulverised fuel ash", "pulverized fuel ash"],
    },
    SynonymEntry {
        material: ReactiveScm::SilicaFume,
        codes: &["sf", "ms", "csf"],
        names: &["silica fume", "microsilica", "micro silica", "condensed silica"],
    },
    SynonymEntry {
        material: ReactiveScm::Slag,
        codes: &["ggbs", "ggbfs", "gbfs", "bfs"],
        names: &["blast furnace slag", "blastfurnace slag", "ground granulated slag", "slag cement"],
    },
    SynonymEntry {
        material: ReactiveScm::NaturalPozzolan,
        codes: &["np"],
        names: &["natural pozzolan", "pozzolan", "pozzolana"],
    },
    SynonymEntry {
        material: ReactiveScm::Metakaolin,
        codes: &["mk"],
        names: &["metakaolin"],
    },
];

/// Substrings that mark a material as non-reactive, overriding [`SYNONYMS`]
pub const INERT_OVERRIDES: &[&str] = &["limestone"];

/// Substrings of other known inert fillers, checked after [`SYNONYMS`]
pub const INERT_FILLERS: &[&str] = &["quartz powder", "quartz flour", "stone dust", "filler"];

/// Lowercase, unify separators and collapse whitespace
pub fn normalize_subtype(subtype: &str) -> String {
    subtype
        .to_lowercase()
        .replace(['-', '_', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve an SCM subtype against the synonym table
pub fn match_scm(subtype: &str) -> Cementitious {
    let normalized = normalize_subtype(subtype);

    if INERT_OVERRIDES.iter().any(|word| normalized.contains(word)) {
        return Cementitious::InertFiller;
    }

    for entry in SYNONYMS {
        if entry.codes.iter().any(|code| normalized == *code)
            || entry.names.iter().any(|name| normalized.contains(name))
        {
            return Cementitious::ReactiveScm(entry.material);
        }
    }

    if INERT_FILLERS.iter().any(|word| normalized.contains(word)) {
        return Cementitious::InertFiller;
    }

    Cementitious::Other
}

/// Classify a material by class code and free-text subtype
pub fn classify(class_code: &str, subtype: &str) -> Cementitious {
    classify_class(&MaterialClass::from_code(class_code), subtype)
}

/// Classify an already-parsed material class
pub fn classify_class(class: &MaterialClass, subtype: &str) -> Cementitious {
    match class {
        MaterialClass::Cement => Cementitious::Cement,
        MaterialClass::Scm => match_scm(subtype),
        _ => Cementitious::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cement_always_cementitious() {
        assert_eq!(classify("CEMENT", "CEM I 42.5R"), Cementitious::Cement);
        assert_eq!(classify("cement", ""), Cementitious::Cement);
        // Subtype text never demotes a cement
        assert!(classify("CEMENT", "limestone cement CEM II/A-LL").is_cementitious());
    }

    #[test]
    fn test_limestone_powder_is_never_cementitious() {
        let category = classify("SCM", "Limestone Powder");
        assert_eq!(category, Cementitious::InertFiller);
        assert!(!category.is_cementitious());
    }

    #[test]
    fn test_limestone_override_beats_reactive_match() {
        assert_eq!(classify("SCM", "limestone fly ash blend"), Cementitious::InertFiller);
        assert_eq!(classify("SCM", "Limestone calcined clay pozzolan"), Cementitious::InertFiller);
    }

    #[test]
    fn test_slag_synonyms() {
        for subtype in ["GGBS", "ggbfs", "Ground Granulated Blast Furnace Slag", "Blast-Furnace Slag"] {
            assert_eq!(
                classify("SCM", subtype),
                Cementitious::ReactiveScm(ReactiveScm::Slag),
                "subtype {:?}",
                subtype
            );
        }
    }

    #[test]
    fn test_short_codes_match_whole_subtype_only() {
        assert_eq!(classify("SCM", "FA"), Cementitious::ReactiveScm(ReactiveScm::FlyAsh));
        assert_eq!(classify("SCM", " sf "), Cementitious::ReactiveScm(ReactiveScm::SilicaFume));
        // "fa" inside another word is not fly ash
        assert_eq!(classify("SCM", "fabric dust"), Cementitious::Other);
    }

    #[test]
    fn test_long_names_match_as_substrings() {
        assert_eq!(
            classify("SCM", "Class F fly ash"),
            Cementitious::ReactiveScm(ReactiveScm::FlyAsh)
        );
        assert_eq!(
            classify("SCM", "undensified silica fume"),
            Cementitious::ReactiveScm(ReactiveScm::SilicaFume)
        );
        assert_eq!(
            classify("SCM", "Natural Pozzolan"),
            Cementitious::ReactiveScm(ReactiveScm::NaturalPozzolan)
        );
    }

    #[test]
    fn test_inert_fillers_and_unknown_scm() {
        assert_eq!(classify("SCM", "quartz powder"), Cementitious::InertFiller);
        assert_eq!(classify("SCM", "rice husk something"), Cementitious::Other);
    }

    #[test]
    fn test_non_binder_classes() {
        assert_eq!(classify("WATER", "fly ash"), Cementitious::Other);
        assert_eq!(classify("AGGR_C", "crushed granite"), Cementitious::Other);
        assert_eq!(classify("ADM", "PCE superplasticizer"), Cementitious::Other);
    }

    #[test]
    fn test_material_class_codes_round_trip() {
        for code in ["CEMENT", "SCM", "WATER", "AGGR_C", "AGGR_F", "ADM", "FIBER"] {
            let class = MaterialClass::from_code(code);
            assert!(class.is_known());
            assert_eq!(class.code(), code);
        }
        assert!(!MaterialClass::from_code("PIGMENT").is_known());
    }

    #[test]
    fn test_normalize_subtype() {
        assert_eq!(normalize_subtype("  Blast-Furnace_Slag  "), "blast furnace slag");
    }
}
