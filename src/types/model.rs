//! CMS risk adjustment model variants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A CMS risk adjustment model variant.
///
/// The variant is chosen at pipeline construction time and selects which
/// reference tables load and which interaction definitions run. The set is
/// closed: annual CMS updates change table contents, not the variant list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    /// CMS-HCC community/institutional model, version 22
    #[serde(rename = "V22", alias = "CMS-HCC Model V22")]
    V22,

    /// CMS-HCC community/institutional model, version 24
    #[serde(rename = "V24", alias = "CMS-HCC Model V24")]
    V24,

    /// CMS-HCC community/institutional model, version 28
    #[serde(rename = "V28", alias = "CMS-HCC Model V28")]
    V28,

    /// CMS-HCC ESRD model, version 21
    #[serde(rename = "ESRDV21", alias = "CMS-HCC ESRD Model V21")]
    EsrdV21,

    /// CMS-HCC ESRD model, version 24
    #[serde(rename = "ESRDV24", alias = "CMS-HCC ESRD Model V24")]
    EsrdV24,

    /// RxHCC prescription drug model, version 08
    #[serde(rename = "RXHCCV08", alias = "RxHCC Model V08")]
    RxHccV08,
}

/// Error for model names outside the closed variant set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model variant: {0}")]
pub struct UnknownModelError(pub String);

impl ModelVariant {
    /// All supported variants, in table order.
    pub const ALL: [ModelVariant; 6] = [
        ModelVariant::V22,
        ModelVariant::V24,
        ModelVariant::V28,
        ModelVariant::EsrdV21,
        ModelVariant::EsrdV24,
        ModelVariant::RxHccV08,
    ];

    /// The long model name as it appears in the `model_name` column of the
    /// CMS reference CSVs.
    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::V22 => "CMS-HCC Model V22",
            ModelVariant::V24 => "CMS-HCC Model V24",
            ModelVariant::V28 => "CMS-HCC Model V28",
            ModelVariant::EsrdV21 => "CMS-HCC ESRD Model V21",
            ModelVariant::EsrdV24 => "CMS-HCC ESRD Model V24",
            ModelVariant::RxHccV08 => "RxHCC Model V08",
        }
    }

    /// Compact spelling used in reference table file names.
    pub fn short_name(&self) -> &'static str {
        match self {
            ModelVariant::V22 => "V22",
            ModelVariant::V24 => "V24",
            ModelVariant::V28 => "V28",
            ModelVariant::EsrdV21 => "ESRDV21",
            ModelVariant::EsrdV24 => "ESRDV24",
            ModelVariant::RxHccV08 => "RXHCCV08",
        }
    }

    /// Whether this is one of the ESRD (dialysis/transplant) models.
    pub fn is_esrd(&self) -> bool {
        matches!(self, ModelVariant::EsrdV21 | ModelVariant::EsrdV24)
    }

    /// Whether this is the prescription drug model.
    pub fn is_rx(&self) -> bool {
        matches!(self, ModelVariant::RxHccV08)
    }

    /// True when a `model_name` CSV cell refers to this variant, accepting
    /// both the long CMS spelling and the compact file-name spelling.
    pub fn matches_model_name(&self, cell: &str) -> bool {
        let cell = cell.trim();
        cell.eq_ignore_ascii_case(self.name()) || cell.eq_ignore_ascii_case(self.short_name())
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelVariant {
    type Err = UnknownModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.matches_model_name(s))
            .ok_or_else(|| UnknownModelError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_names() {
        assert_eq!("V28".parse::<ModelVariant>().unwrap(), ModelVariant::V28);
        assert_eq!(
            "CMS-HCC ESRD Model V24".parse::<ModelVariant>().unwrap(),
            ModelVariant::EsrdV24
        );
        assert_eq!(
            "rxhccv08".parse::<ModelVariant>().unwrap(),
            ModelVariant::RxHccV08
        );
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let err = "V99".parse::<ModelVariant>().unwrap_err();
        assert_eq!(err, UnknownModelError("V99".to_string()));
    }

    #[test]
    fn test_model_name_matching() {
        assert!(ModelVariant::V28.matches_model_name("CMS-HCC Model V28"));
        assert!(ModelVariant::V28.matches_model_name(" V28 "));
        assert!(!ModelVariant::V28.matches_model_name("CMS-HCC Model V24"));
    }
}
