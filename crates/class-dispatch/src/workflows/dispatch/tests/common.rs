use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::Response;
use chrono::{NaiveDate, Weekday};
use serde_json::Value;

use crate::security::LoginRateLimiter;
use crate::workflows::dispatch::domain::{
    AssignmentId, AssignmentStatus, GradeKey, Instructor, InstructorAssignment, InstructorId,
    InstructorStatus, Payment, PaymentId, Program, RequestId, RequestStatus, School, SchoolId,
    SchoolRequest,
};
use crate::workflows::dispatch::fees::{FeeCalculator, FeeInput, PaymentBreakdown};
use crate::workflows::dispatch::repository::{
    AutomationCommit, DispatchRepository, InMemoryDispatchRepository, RepositoryError,
};
use crate::workflows::dispatch::router::{dispatch_router, DispatchState};
use crate::workflows::dispatch::rules::{RuleConfig, RuleProvider};
use crate::workflows::dispatch::AutomationWorkflow;

pub(super) fn rule_entries() -> BTreeMap<String, String> {
    [
        ("sessionFees.1", "45000"),
        ("sessionFees.2", "80000"),
        ("sessionFees.4", "150000"),
        ("transport_0_20", "0"),
        ("transport_20_40", "15000"),
        ("transport_40_60", "25000"),
        ("transport_60_80", "35000"),
        ("transport_80_plus", "50000"),
        ("grades.internal_level1.minClasses", "0"),
        ("grades.internal_level1.minRating", "0"),
        ("grades.internal_level1.feeMultiplier", "1.0"),
        ("grades.internal_level1.priority", "1"),
        ("grades.internal_level1.name", "Level 1"),
        ("grades.internal_level2.minClasses", "50"),
        ("grades.internal_level2.minRating", "4.0"),
        ("grades.internal_level2.feeMultiplier", "1.1"),
        ("grades.internal_level2.priority", "2"),
        ("grades.internal_level2.name", "Level 2"),
        ("grades.external_basic.minClasses", "0"),
        ("grades.external_basic.minRating", "0"),
        ("grades.external_basic.feeMultiplier", "1.2"),
        ("grades.external_basic.priority", "1"),
        ("specialAllowances.weekend", "20000"),
        ("specialAllowances.holiday", "30000"),
        ("specialAllowances.emergency", "15000"),
        ("specialAllowances.multipleClasses", "10000"),
        ("taxWithholdingRate", "0.033"),
        ("minSessionFee", "70000"),
        ("maxSessionFee", "150000"),
        ("subjectCategories.coding", "코딩,로봇,Python"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

pub(super) fn rules_with(overrides: &[(&str, &str)]) -> Arc<RuleConfig> {
    let mut entries = rule_entries();
    for (key, value) in overrides {
        entries.insert(key.to_string(), value.to_string());
    }
    Arc::new(RuleConfig::from_entries(&entries).expect("fixture rules parse"))
}

pub(super) fn rules() -> Arc<RuleConfig> {
    rules_with(&[])
}

pub(super) fn calculator() -> FeeCalculator {
    FeeCalculator::new(rules())
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Monday, nine days after [`submitted_on`].
pub(super) fn class_date() -> NaiveDate {
    date(2025, 3, 10)
}

pub(super) fn submitted_on() -> NaiveDate {
    date(2025, 3, 1)
}

pub(super) fn today() -> NaiveDate {
    date(2025, 3, 2)
}

pub(super) fn instructor(id: &str, region: &str, subjects: &[&str], grade: GradeKey) -> Instructor {
    Instructor {
        id: InstructorId(id.to_string()),
        name: format!("Instructor {id}"),
        home_region: region.to_string(),
        travel_radius_km: 40,
        subjects: subjects.iter().map(|subject| subject.to_string()).collect(),
        available_days: vec![Weekday::Mon, Weekday::Wed, Weekday::Sat],
        status: InstructorStatus::Active,
        instructor_type: grade.instructor_type(),
        grade,
        total_classes: 80,
        rating: 4.6,
    }
}

pub(super) fn school_request(id: &str, region: &str, category: Option<&str>) -> SchoolRequest {
    SchoolRequest {
        id: RequestId(id.to_string()),
        school: School {
            id: SchoolId("school-1".to_string()),
            name: "Hanbit Elementary".to_string(),
            region: region.to_string(),
        },
        program: Some(Program {
            id: "prog-robotics".to_string(),
            name: "Robot Coding".to_string(),
            category: category.map(str::to_string),
        }),
        custom_program: None,
        submitted_on: submitted_on(),
        desired_date: class_date(),
        alternate_date: None,
        start_time: None,
        session_count: 2,
        student_count: 20,
        target_grade: "5".to_string(),
        budget: None,
        status: RequestStatus::Submitted,
    }
}

/// Seoul request, one Seoul level-2 instructor 35 km from the school, one Busan instructor.
pub(super) fn seeded_repository() -> Arc<InMemoryDispatchRepository> {
    let repository = Arc::new(InMemoryDispatchRepository::default());
    repository.insert_request(school_request("req-1", "Seoul", Some("coding")));
    repository.add_instructor(instructor(
        "ins-busan",
        "Busan",
        &["로봇 코딩"],
        GradeKey::InternalLevel1,
    ));
    repository.add_instructor(instructor(
        "ins-seoul",
        "Seoul",
        &["Python 기초", "미술"],
        GradeKey::InternalLevel2,
    ));
    repository.record_distance(
        &InstructorId("ins-seoul".to_string()),
        &SchoolId("school-1".to_string()),
        35.0,
    );
    repository
}

pub(super) fn workflow<R>(repository: Arc<R>, rules: Arc<RuleConfig>) -> AutomationWorkflow<R>
where
    R: DispatchRepository + 'static,
{
    let provider: Arc<dyn RuleProvider> = Arc::new(rules);
    AutomationWorkflow::new(repository, provider)
}

pub(super) fn breakdown_for(sessions: u32, grade: GradeKey) -> PaymentBreakdown {
    calculator()
        .compute(&FeeInput::new(sessions, grade.instructor_type(), grade))
        .expect("fixture fee computes")
}

pub(super) fn assignment(id: &str, status: AssignmentStatus) -> InstructorAssignment {
    InstructorAssignment {
        id: AssignmentId(id.to_string()),
        request_id: RequestId("req-1".to_string()),
        instructor_id: InstructorId("ins-seoul".to_string()),
        status,
        scheduled_date: class_date(),
        start_time: None,
        distance_km: None,
        transport_fee: 0,
        breakdown: breakdown_for(2, GradeKey::InternalLevel1),
    }
}

pub(super) fn router_with(repository: Arc<InMemoryDispatchRepository>) -> axum::Router {
    let workflow = Arc::new(workflow(repository, rules()));
    dispatch_router(DispatchState::new(
        workflow,
        Arc::new(LoginRateLimiter::default()),
    ))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Serves reads from a seeded store but fails every write.
pub(super) struct CommitFailingRepository {
    pub(super) inner: Arc<InMemoryDispatchRepository>,
}

impl DispatchRepository for CommitFailingRepository {
    fn fetch_request(&self, id: &RequestId) -> Result<Option<SchoolRequest>, RepositoryError> {
        self.inner.fetch_request(id)
    }

    fn list_instructors(&self) -> Result<Vec<Instructor>, RepositoryError> {
        self.inner.list_instructors()
    }

    fn active_assignments_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError> {
        self.inner.active_assignments_for_request(id)
    }

    fn assignments_for_instructor_on(
        &self,
        id: &InstructorId,
        date: NaiveDate,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError> {
        self.inner.assignments_for_instructor_on(id, date)
    }

    fn known_distance_km(
        &self,
        instructor: &InstructorId,
        school: &SchoolId,
    ) -> Result<Option<f64>, RepositoryError> {
        self.inner.known_distance_km(instructor, school)
    }

    fn commit_automation(&self, _commit: AutomationCommit) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("write timeout".to_string()))
    }

    fn fetch_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<InstructorAssignment>, RepositoryError> {
        self.inner.fetch_assignment(id)
    }

    fn save_payment(&self, _payment: Payment) -> Result<Payment, RepositoryError> {
        Err(RepositoryError::Unavailable("write timeout".to_string()))
    }

    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        self.inner.fetch_payment(id)
    }

    fn update_payment(&self, _payment: Payment) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("write timeout".to_string()))
    }
}

/// Fails every call.
pub(super) struct UnavailableRepository;

impl UnavailableRepository {
    fn down<T>() -> Result<T, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl DispatchRepository for UnavailableRepository {
    fn fetch_request(&self, _id: &RequestId) -> Result<Option<SchoolRequest>, RepositoryError> {
        Self::down()
    }

    fn list_instructors(&self) -> Result<Vec<Instructor>, RepositoryError> {
        Self::down()
    }

    fn active_assignments_for_request(
        &self,
        _id: &RequestId,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError> {
        Self::down()
    }

    fn assignments_for_instructor_on(
        &self,
        _id: &InstructorId,
        _date: NaiveDate,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError> {
        Self::down()
    }

    fn known_distance_km(
        &self,
        _instructor: &InstructorId,
        _school: &SchoolId,
    ) -> Result<Option<f64>, RepositoryError> {
        Self::down()
    }

    fn commit_automation(&self, _commit: AutomationCommit) -> Result<(), RepositoryError> {
        Self::down()
    }

    fn fetch_assignment(
        &self,
        _id: &AssignmentId,
    ) -> Result<Option<InstructorAssignment>, RepositoryError> {
        Self::down()
    }

    fn save_payment(&self, _payment: Payment) -> Result<Payment, RepositoryError> {
        Self::down()
    }

    fn fetch_payment(&self, _id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Self::down()
    }

    fn update_payment(&self, _payment: Payment) -> Result<(), RepositoryError> {
        Self::down()
    }
}
