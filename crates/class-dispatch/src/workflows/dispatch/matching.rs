use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Instructor, InstructorId, SchoolRequest};

/// Program category -> subject keywords an instructor must carry at least one of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCategoryMap {
    categories: BTreeMap<String, Vec<String>>,
}

impl SubjectCategoryMap {
    pub fn new(categories: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
        }
    }

    pub fn keywords(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Subjects that contain one of the category's keywords (case-sensitive substring).
    /// A category without a configured mapping uses its own name as the only keyword.
    pub fn matching_subjects(&self, category: &str, subjects: &[String]) -> Vec<String> {
        let fallback = [category.to_string()];
        let keywords = match self.keywords(category) {
            Some(keywords) if !keywords.is_empty() => keywords,
            _ => &fallback[..],
        };

        subjects
            .iter()
            .filter(|subject| keywords.iter().any(|keyword| subject.contains(keyword.as_str())))
            .cloned()
            .collect()
    }
}

/// Candidate entry in a ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub rank: usize,
    pub instructor_id: InstructorId,
    pub instructor_name: String,
    pub region_match: bool,
    pub matched_subjects: Vec<String>,
    /// Informational only; does not influence ordering.
    pub available_on_desired_day: bool,
    pub pool_position: usize,
}

/// Filters active, subject-compatible instructors and orders same-region candidates first.
#[derive(Debug, Clone, Default)]
pub struct InstructorMatcher {
    categories: SubjectCategoryMap,
}

impl InstructorMatcher {
    pub fn new(categories: SubjectCategoryMap) -> Self {
        Self { categories }
    }

    pub fn rank(&self, request: &SchoolRequest, pool: &[Instructor]) -> Vec<RankedCandidate> {
        let category = request.program_category();
        let weekday = request.desired_weekday();

        let mut candidates: Vec<RankedCandidate> = pool
            .iter()
            .enumerate()
            .filter(|(_, instructor)| instructor.is_active())
            .filter_map(|(position, instructor)| {
                let matched_subjects = match category {
                    Some(category) => {
                        let matched = self
                            .categories
                            .matching_subjects(category, &instructor.subjects);
                        if matched.is_empty() {
                            return None;
                        }
                        matched
                    }
                    None => Vec::new(),
                };

                Some(RankedCandidate {
                    rank: 0,
                    instructor_id: instructor.id.clone(),
                    instructor_name: instructor.name.clone(),
                    region_match: instructor.home_region == request.school.region,
                    matched_subjects,
                    available_on_desired_day: instructor.is_available_on(weekday),
                    pool_position: position,
                })
            })
            .collect();

        // Vec::sort_by_key is stable, so pool order survives inside each region group.
        candidates.sort_by_key(|candidate| !candidate.region_match);
        for (index, candidate) in candidates.iter_mut().enumerate() {
            candidate.rank = index + 1;
        }
        candidates
    }
}
