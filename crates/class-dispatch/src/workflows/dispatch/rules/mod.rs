//! Strongly typed rule snapshot parsed from the admin key/value settings table.

mod parse;
mod source;

pub use source::{
    CsvRuleSource, RuleConfigCache, RuleProvider, RuleSource, RuleSourceError, StaticRuleSource,
};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::GradeKey;
use super::fees::{
    AllowanceKind, DistanceBand, FeeBounds, GradeDefinition, GradeRuleEngine, Rate,
    SessionFeeTable, SpecialAllowances, TransportFeeTable,
};
use super::matching::SubjectCategoryMap;
use parse::{parse_value, split_list, within, Entries};

pub const DEFAULT_TAX_WITHHOLDING_RATE: f64 = 0.033;
pub const DEFAULT_QUOTE_VALIDITY_DAYS: u32 = 14;

/// Errors raised while turning raw settings into a [`RuleConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleConfigError {
    #[error("missing required setting `{0}`")]
    MissingKey(String),
    #[error("setting `{key}` = `{value}` is not a valid {expected}")]
    Malformed {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("setting `{key}` = {value} is outside {range}")]
    OutOfRange {
        key: String,
        value: String,
        range: String,
    },
    #[error("minSessionFee {min} exceeds maxSessionFee {max}")]
    InvertedBounds { min: u64, max: u64 },
    #[error("no sessionFees.<n> entries configured")]
    NoSessionFees,
    #[error("unknown grade id `{0}`")]
    UnknownGradeId(String),
    #[error("unknown grade field `grades.{grade}.{field}`")]
    UnknownGradeField { grade: String, field: String },
}

/// Quote-side pricing knobs that sit on top of the instructor payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePolicy {
    pub margin_rate: Rate,
    pub material_cost_per_student: u64,
    pub validity_days: u32,
}

impl Default for QuotePolicy {
    fn default() -> Self {
        Self {
            margin_rate: Rate::ZERO,
            material_cost_per_student: 0,
            validity_days: DEFAULT_QUOTE_VALIDITY_DAYS,
        }
    }
}

/// Immutable rule snapshot shared by the calculator, matcher and automation workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub session_fees: SessionFeeTable,
    pub transport_fees: TransportFeeTable,
    pub grades: GradeRuleEngine,
    pub allowances: SpecialAllowances,
    pub tax_withholding_rate: Rate,
    pub fee_bounds: FeeBounds,
    pub subject_categories: SubjectCategoryMap,
    pub quote: QuotePolicy,
    pub default_transport_band: Option<DistanceBand>,
}

impl RuleConfig {
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Result<Self, RuleConfigError> {
        let entries = Entries::new(entries);

        let session_fees = parse_session_fees(&entries)?;
        let transport_fees = parse_transport_fees(&entries)?;
        let grades = parse_grades(&entries)?;

        let allowances = SpecialAllowances {
            weekend: allowance(&entries, AllowanceKind::Weekend)?,
            holiday: allowance(&entries, AllowanceKind::Holiday)?,
            emergency: allowance(&entries, AllowanceKind::Emergency)?,
            multiple_classes: allowance(&entries, AllowanceKind::MultipleClasses)?,
        };

        let tax_rate = entries
            .optional::<f64>("taxWithholdingRate", "decimal rate")?
            .unwrap_or(DEFAULT_TAX_WITHHOLDING_RATE);
        let tax_withholding_rate =
            Rate::from_fraction(within("taxWithholdingRate", tax_rate, 0.0..=0.5)?);

        let min: u64 = entries.required("minSessionFee", "won amount")?;
        let max: u64 = entries.required("maxSessionFee", "won amount")?;
        if min > max {
            return Err(RuleConfigError::InvertedBounds { min, max });
        }

        let subject_categories = SubjectCategoryMap::new(
            entries
                .with_prefix("subjectCategories")
                .into_iter()
                .map(|(category, keywords)| (category.to_string(), split_list(keywords, ','))),
        );

        let margin = entries
            .optional::<f64>("quote.marginRate", "decimal rate")?
            .map(|rate| within("quote.marginRate", rate, 0.0..=1.0))
            .transpose()?
            .unwrap_or(0.0);
        let quote = QuotePolicy {
            margin_rate: Rate::from_fraction(margin),
            material_cost_per_student: entries
                .optional("quote.materialCostPerStudent", "won amount")?
                .unwrap_or(0),
            validity_days: entries
                .optional("quote.validityDays", "day count")?
                .unwrap_or(DEFAULT_QUOTE_VALIDITY_DAYS),
        };

        let default_transport_band = entries
            .raw("automation.defaultTransportBand")
            .map(|raw| {
                DistanceBand::from_key(raw).ok_or_else(|| RuleConfigError::Malformed {
                    key: "automation.defaultTransportBand".to_string(),
                    value: raw.to_string(),
                    expected: "band (0_20, 20_40, 40_60, 60_80, 80_plus)",
                })
            })
            .transpose()?;

        Ok(Self {
            session_fees,
            transport_fees,
            grades,
            allowances,
            tax_withholding_rate,
            fee_bounds: FeeBounds { min, max },
            subject_categories,
            quote,
            default_transport_band,
        })
    }
}

fn parse_session_fees(entries: &Entries<'_>) -> Result<SessionFeeTable, RuleConfigError> {
    let mut fees = BTreeMap::new();
    for (count, fee) in entries.with_prefix("sessionFees") {
        let key = format!("sessionFees.{count}");
        let sessions: u32 = parse_value(&key, count, "session count")?;
        if sessions == 0 {
            return Err(RuleConfigError::OutOfRange {
                key,
                value: count.to_string(),
                range: "1..".to_string(),
            });
        }
        fees.insert(sessions, parse_value(&key, fee, "won amount")?);
    }

    if fees.is_empty() {
        return Err(RuleConfigError::NoSessionFees);
    }
    Ok(SessionFeeTable::new(fees))
}

fn parse_transport_fees(entries: &Entries<'_>) -> Result<TransportFeeTable, RuleConfigError> {
    let mut fees = [0u64; 5];
    for (slot, band) in fees.iter_mut().zip(DistanceBand::ordered()) {
        *slot = entries.required(&format!("transport_{}", band.key()), "won amount")?;
    }
    Ok(TransportFeeTable::new(fees))
}

fn allowance(entries: &Entries<'_>, kind: AllowanceKind) -> Result<u64, RuleConfigError> {
    entries.required(&format!("specialAllowances.{}", kind.key()), "won amount")
}

#[derive(Default)]
struct GradeFields<'a> {
    min_classes: Option<&'a str>,
    min_rating: Option<&'a str>,
    fee_multiplier: Option<&'a str>,
    priority: Option<&'a str>,
    name: Option<&'a str>,
    benefits: Option<&'a str>,
}

fn parse_grades(entries: &Entries<'_>) -> Result<GradeRuleEngine, RuleConfigError> {
    let mut raw: BTreeMap<GradeKey, GradeFields<'_>> = BTreeMap::new();

    for (rest, value) in entries.with_prefix("grades") {
        let (id, field) = rest
            .split_once('.')
            .ok_or_else(|| RuleConfigError::UnknownGradeId(rest.to_string()))?;
        let grade =
            GradeKey::from_key(id).ok_or_else(|| RuleConfigError::UnknownGradeId(id.to_string()))?;
        let fields = raw.entry(grade).or_default();
        match field {
            "minClasses" => fields.min_classes = Some(value),
            "minRating" => fields.min_rating = Some(value),
            "feeMultiplier" => fields.fee_multiplier = Some(value),
            "priority" => fields.priority = Some(value),
            "name" => fields.name = Some(value),
            "benefits" => fields.benefits = Some(value),
            other => {
                return Err(RuleConfigError::UnknownGradeField {
                    grade: id.to_string(),
                    field: other.to_string(),
                })
            }
        }
    }

    let mut definitions = Vec::with_capacity(raw.len());
    for (grade, fields) in raw {
        let prefix = format!("grades.{}", grade.key());
        let field = |name: &str, value: Option<&str>| -> Result<(String, String), RuleConfigError> {
            let key = format!("{prefix}.{name}");
            match value.filter(|value| !value.is_empty()) {
                Some(value) => Ok((key, value.to_string())),
                None => Err(RuleConfigError::MissingKey(key)),
            }
        };

        let (key, value) = field("minClasses", fields.min_classes)?;
        let min_classes: u32 = parse_value(&key, &value, "class count")?;

        let (key, value) = field("minRating", fields.min_rating)?;
        let min_rating = within(&key, parse_value(&key, &value, "rating")?, 0.0..=5.0)?;

        let (key, value) = field("feeMultiplier", fields.fee_multiplier)?;
        let fee_multiplier = within(&key, parse_value(&key, &value, "multiplier")?, 0.5..=3.0)?;

        let (key, value) = field("priority", fields.priority)?;
        let priority: u32 = parse_value(&key, &value, "priority")?;

        definitions.push(GradeDefinition {
            grade,
            name: fields
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or(grade.key())
                .to_string(),
            min_classes,
            min_rating: min_rating as f32,
            fee_multiplier,
            priority,
            benefits: fields
                .benefits
                .map(|benefits| split_list(benefits, ';'))
                .unwrap_or_default(),
        });
    }

    Ok(GradeRuleEngine::new(definitions))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_entries() -> BTreeMap<String, String> {
        [
            ("sessionFees.2", "80000"),
            ("sessionFees.4", "150000"),
            ("transport_0_20", "0"),
            ("transport_20_40", "15000"),
            ("transport_40_60", "25000"),
            ("transport_60_80", "35000"),
            ("transport_80_plus", "50000"),
            ("grades.internal_level2.minClasses", "20"),
            ("grades.internal_level2.minRating", "4.0"),
            ("grades.internal_level2.feeMultiplier", "1.1"),
            ("grades.internal_level2.priority", "2"),
            ("grades.internal_level2.benefits", "priority booking; training budget"),
            ("specialAllowances.weekend", "20000"),
            ("specialAllowances.holiday", "30000"),
            ("specialAllowances.emergency", "15000"),
            ("specialAllowances.multipleClasses", "10000"),
            ("minSessionFee", "70000"),
            ("maxSessionFee", "150000"),
            ("site.title", "ignored"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
    }

    #[test]
    fn parses_complete_settings() {
        let config = RuleConfig::from_entries(&base_entries()).expect("valid settings");

        assert_eq!(config.session_fees.lookup(2).expect("configured").fee, 80_000);
        assert_eq!(
            config.transport_fees.fee_for_band(DistanceBand::UpTo40),
            15_000
        );
        assert_eq!(config.tax_withholding_rate, Rate::from_fraction(0.033));
        assert_eq!(config.fee_bounds, FeeBounds { min: 70_000, max: 150_000 });
        assert_eq!(config.quote, QuotePolicy::default());
        assert_eq!(config.default_transport_band, None);

        let grade = config
            .grades
            .definition(GradeKey::InternalLevel2)
            .expect("grade parsed");
        assert_eq!(grade.fee_multiplier, 1.1);
        assert_eq!(grade.name, "internal_level2");
        assert_eq!(grade.benefits, vec!["priority booking", "training budget"]);
    }

    #[test]
    fn missing_required_key_fails_fast() {
        let mut entries = base_entries();
        entries.remove("transport_60_80");

        assert_eq!(
            RuleConfig::from_entries(&entries),
            Err(RuleConfigError::MissingKey("transport_60_80".to_string()))
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut entries = base_entries();
        entries.insert("taxWithholdingRate".to_string(), "0.75".to_string());
        assert!(matches!(
            RuleConfig::from_entries(&entries),
            Err(RuleConfigError::OutOfRange { key, .. }) if key == "taxWithholdingRate"
        ));

        let mut entries = base_entries();
        entries.insert(
            "grades.internal_level2.feeMultiplier".to_string(),
            "3.5".to_string(),
        );
        assert!(matches!(
            RuleConfig::from_entries(&entries),
            Err(RuleConfigError::OutOfRange { key, .. })
                if key == "grades.internal_level2.feeMultiplier"
        ));
    }

    #[test]
    fn rejects_malformed_numbers_and_inverted_bounds() {
        let mut entries = base_entries();
        entries.insert("sessionFees.4".to_string(), "150,000".to_string());
        assert!(matches!(
            RuleConfig::from_entries(&entries),
            Err(RuleConfigError::Malformed { key, .. }) if key == "sessionFees.4"
        ));

        let mut entries = base_entries();
        entries.insert("minSessionFee".to_string(), "200000".to_string());
        assert_eq!(
            RuleConfig::from_entries(&entries),
            Err(RuleConfigError::InvertedBounds {
                min: 200_000,
                max: 150_000
            })
        );
    }

    #[test]
    fn incomplete_grade_reports_the_missing_field() {
        let mut entries = base_entries();
        entries.insert(
            "grades.external_vip.feeMultiplier".to_string(),
            "1.5".to_string(),
        );

        assert_eq!(
            RuleConfig::from_entries(&entries),
            Err(RuleConfigError::MissingKey(
                "grades.external_vip.minClasses".to_string()
            ))
        );
    }

    #[test]
    fn unknown_grade_ids_are_rejected() {
        let mut entries = base_entries();
        entries.insert("grades.gold.minClasses".to_string(), "3".to_string());

        assert_eq!(
            RuleConfig::from_entries(&entries),
            Err(RuleConfigError::UnknownGradeId("gold".to_string()))
        );
    }

    #[test]
    fn parses_quote_and_automation_settings() {
        let mut entries = base_entries();
        entries.insert("quote.marginRate".to_string(), "0.15".to_string());
        entries.insert("quote.materialCostPerStudent".to_string(), "3000".to_string());
        entries.insert("quote.validityDays".to_string(), "7".to_string());
        entries.insert(
            "automation.defaultTransportBand".to_string(),
            "20_40".to_string(),
        );
        entries.insert(
            "subjectCategories.coding".to_string(),
            "코딩, 소프트웨어".to_string(),
        );

        let config = RuleConfig::from_entries(&entries).expect("valid settings");

        assert_eq!(config.quote.margin_rate, Rate::from_ppm(150_000));
        assert_eq!(config.quote.material_cost_per_student, 3_000);
        assert_eq!(config.quote.validity_days, 7);
        assert_eq!(config.default_transport_band, Some(DistanceBand::UpTo40));
        assert_eq!(
            config.subject_categories.keywords("coding"),
            Some(&["코딩".to_string(), "소프트웨어".to_string()][..])
        );
    }
}
