use chrono::{Datelike, NaiveDate, Weekday};
use class_dispatch::config::RulesConfig;
use class_dispatch::workflows::dispatch::fees::DistanceBand;
use class_dispatch::workflows::dispatch::{
    CsvRuleSource, GradeKey, InMemoryDispatchRepository, Instructor, InstructorId,
    InstructorStatus, Program, RequestId, RequestStatus, RuleConfig, RuleConfigCache,
    RuleProvider, RuleSource, RuleSourceError, School, SchoolId, SchoolRequest, StaticRuleSource,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) rules: Arc<dyn RuleReloader>,
}

/// Admin hook behind `POST /api/v1/rules/reload`.
pub(crate) trait RuleReloader: Send + Sync {
    fn reload(&self) -> Result<Arc<RuleConfig>, RuleSourceError>;
}

impl<S: RuleSource> RuleReloader for RuleConfigCache<S> {
    fn reload(&self) -> Result<Arc<RuleConfig>, RuleSourceError> {
        RuleConfigCache::reload(self)
    }
}

/// One cache, exposed both as the workflow's rule provider and as the admin reload hook.
pub(crate) struct RuleHandles {
    pub(crate) provider: Arc<dyn RuleProvider>,
    pub(crate) reloader: Arc<dyn RuleReloader>,
}

pub(crate) fn rule_handles(config: &RulesConfig) -> RuleHandles {
    match &config.settings_path {
        Some(path) => cached(CsvRuleSource::new(path)),
        None => cached(StaticRuleSource::new(default_rule_entries())),
    }
}

fn cached<S: RuleSource + 'static>(source: S) -> RuleHandles {
    let cache = Arc::new(RuleConfigCache::new(source));
    RuleHandles {
        provider: Arc::clone(&cache) as Arc<dyn RuleProvider>,
        reloader: cache,
    }
}

/// Settings table served when no export path is configured.
pub(crate) fn default_rule_entries() -> BTreeMap<String, String> {
    [
        ("sessionFees.1", "45000"),
        ("sessionFees.2", "80000"),
        ("sessionFees.3", "115000"),
        ("sessionFees.4", "150000"),
        ("transport_0_20", "0"),
        ("transport_20_40", "15000"),
        ("transport_40_60", "25000"),
        ("transport_60_80", "35000"),
        ("transport_80_plus", "50000"),
        ("grades.internal_level1.name", "Internal Level 1"),
        ("grades.internal_level1.minClasses", "0"),
        ("grades.internal_level1.minRating", "0"),
        ("grades.internal_level1.feeMultiplier", "1.0"),
        ("grades.internal_level1.priority", "1"),
        ("grades.internal_level2.name", "Internal Level 2"),
        ("grades.internal_level2.minClasses", "50"),
        ("grades.internal_level2.minRating", "4.0"),
        ("grades.internal_level2.feeMultiplier", "1.1"),
        ("grades.internal_level2.priority", "2"),
        ("grades.internal_level3.name", "Internal Level 3"),
        ("grades.internal_level3.minClasses", "150"),
        ("grades.internal_level3.minRating", "4.5"),
        ("grades.internal_level3.feeMultiplier", "1.2"),
        ("grades.internal_level3.priority", "3"),
        ("grades.internal_level4.name", "Internal Level 4"),
        ("grades.internal_level4.minClasses", "300"),
        ("grades.internal_level4.minRating", "4.8"),
        ("grades.internal_level4.feeMultiplier", "1.3"),
        ("grades.internal_level4.priority", "4"),
        ("grades.external_basic.name", "External Basic"),
        ("grades.external_basic.minClasses", "0"),
        ("grades.external_basic.minRating", "0"),
        ("grades.external_basic.feeMultiplier", "1.0"),
        ("grades.external_basic.priority", "1"),
        ("grades.external_premium.name", "External Premium"),
        ("grades.external_premium.minClasses", "100"),
        ("grades.external_premium.minRating", "4.5"),
        ("grades.external_premium.feeMultiplier", "1.25"),
        ("grades.external_premium.priority", "2"),
        ("grades.external_vip.name", "External VIP"),
        ("grades.external_vip.minClasses", "200"),
        ("grades.external_vip.minRating", "4.8"),
        ("grades.external_vip.feeMultiplier", "1.5"),
        ("grades.external_vip.priority", "3"),
        ("specialAllowances.weekend", "20000"),
        ("specialAllowances.holiday", "30000"),
        ("specialAllowances.emergency", "15000"),
        ("specialAllowances.multipleClasses", "10000"),
        ("taxWithholdingRate", "0.033"),
        ("minSessionFee", "70000"),
        ("maxSessionFee", "150000"),
        ("quote.marginRate", "0.1"),
        ("quote.materialCostPerStudent", "2000"),
        ("quote.validityDays", "14"),
        ("subjectCategories.coding", "코딩,로봇,Python,Scratch"),
        ("subjectCategories.science", "과학,실험,생명"),
        ("subjectCategories.art", "미술,공예,디자인"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

const FIXED_HOLIDAYS: [(u32, u32); 8] = [
    (1, 1),
    (3, 1),
    (5, 5),
    (6, 6),
    (8, 15),
    (10, 3),
    (10, 9),
    (12, 25),
];

/// Fixed-date public holidays for the given years. Lunar holidays are not included.
pub(crate) fn public_holidays(years: impl IntoIterator<Item = i32>) -> BTreeSet<NaiveDate> {
    years
        .into_iter()
        .flat_map(|year| {
            FIXED_HOLIDAYS
                .iter()
                .filter_map(move |&(month, day)| NaiveDate::from_ymd_opt(year, month, day))
        })
        .collect()
}

/// Demo dataset: two Seoul requests, one Busan request and four instructors.
pub(crate) fn seeded_repository(today: NaiveDate) -> Arc<InMemoryDispatchRepository> {
    let repository = Arc::new(InMemoryDispatchRepository::default());
    let next_monday = next_weekday(today, Weekday::Mon);

    repository.insert_request(SchoolRequest {
        budget: Some(200_000),
        ..school_request(
            "req-robotics",
            ("school-hanbit", "Hanbit Elementary", "Seoul"),
            ("prog-robotics", "Robot Coding", "coding"),
            today,
            next_monday,
        )
    });
    repository.insert_request(SchoolRequest {
        session_count: 4,
        student_count: 30,
        budget: Some(150_000),
        ..school_request(
            "req-lab",
            ("school-mirae", "Mirae Middle School", "Seoul"),
            ("prog-lab", "Science Lab", "science"),
            today,
            next_weekday(today, Weekday::Sat),
        )
    });
    repository.insert_request(school_request(
        "req-art",
        ("school-haeundae", "Haeundae Elementary", "Busan"),
        ("prog-craft", "Craft Studio", "art"),
        today,
        next_monday + chrono::Duration::days(7),
    ));

    repository.add_instructor(instructor(
        "ins-park",
        "Park Jiwoo",
        "Seoul",
        &["Python 기초", "로봇 코딩"],
        GradeKey::InternalLevel2,
        (120, 4.7),
    ));
    repository.add_instructor(instructor(
        "ins-lee",
        "Lee Minseo",
        "Seoul",
        &["생활 과학", "화학 실험"],
        GradeKey::InternalLevel1,
        (30, 4.3),
    ));
    repository.add_instructor(instructor(
        "ins-choi",
        "Choi Yuna",
        "Busan",
        &["미술", "공예"],
        GradeKey::ExternalPremium,
        (140, 4.9),
    ));
    repository.add_instructor(instructor(
        "ins-kang",
        "Kang Doyun",
        "Incheon",
        &["Scratch 코딩"],
        GradeKey::ExternalBasic,
        (12, 4.0),
    ));

    for (instructor_id, school_id, distance_km) in [
        ("ins-park", "school-hanbit", 35.0),
        ("ins-lee", "school-mirae", 12.5),
        ("ins-choi", "school-haeundae", 64.0),
    ] {
        repository.record_distance(
            &InstructorId(instructor_id.to_string()),
            &SchoolId(school_id.to_string()),
            distance_km,
        );
    }

    repository
}

fn school_request(
    id: &str,
    (school_id, school_name, region): (&str, &str, &str),
    (program_id, program_name, category): (&str, &str, &str),
    submitted_on: NaiveDate,
    desired_date: NaiveDate,
) -> SchoolRequest {
    SchoolRequest {
        id: RequestId(id.to_string()),
        school: School {
            id: SchoolId(school_id.to_string()),
            name: school_name.to_string(),
            region: region.to_string(),
        },
        program: Some(Program {
            id: program_id.to_string(),
            name: program_name.to_string(),
            category: Some(category.to_string()),
        }),
        custom_program: None,
        submitted_on,
        desired_date,
        alternate_date: None,
        start_time: None,
        session_count: 2,
        student_count: 24,
        target_grade: "5".to_string(),
        budget: None,
        status: RequestStatus::Submitted,
    }
}

fn instructor(
    id: &str,
    name: &str,
    region: &str,
    subjects: &[&str],
    grade: GradeKey,
    (total_classes, rating): (u32, f32),
) -> Instructor {
    Instructor {
        id: InstructorId(id.to_string()),
        name: name.to_string(),
        home_region: region.to_string(),
        travel_radius_km: 60,
        subjects: subjects.iter().map(|subject| subject.to_string()).collect(),
        available_days: vec![Weekday::Mon, Weekday::Wed, Weekday::Sat],
        status: InstructorStatus::Active,
        instructor_type: grade.instructor_type(),
        grade,
        total_classes,
        rating,
    }
}

/// First `weekday` strictly after `from`.
pub(crate) fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let mut date = from.succ_opt().unwrap_or(from);
    while date.weekday() != weekday {
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    date
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_grade(raw: &str) -> Result<GradeKey, String> {
    GradeKey::from_key(raw.trim()).ok_or_else(|| {
        let known: Vec<&str> = GradeKey::all().iter().map(|grade| grade.key()).collect();
        format!("unknown grade '{raw}' (expected one of {})", known.join(", "))
    })
}

pub(crate) fn parse_band(raw: &str) -> Result<DistanceBand, String> {
    DistanceBand::from_key(raw.trim()).ok_or_else(|| {
        format!("unknown band '{raw}' (expected 0_20, 20_40, 40_60, 60_80, 80_plus)")
    })
}
