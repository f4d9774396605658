use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::FeeError;
use crate::workflows::dispatch::domain::{GradeKey, Instructor, InstructorType};

/// Admin-configured definition of a single grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeDefinition {
    pub grade: GradeKey,
    pub name: String,
    pub min_classes: u32,
    pub min_rating: f32,
    pub fee_multiplier: f64,
    pub priority: u32,
    pub benefits: Vec<String>,
}

/// Multiplier and display data resolved for an instructor's current grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResolution {
    pub grade: GradeKey,
    pub multiplier: f64,
    pub name: String,
    pub benefits: Vec<String>,
}

/// Resolves stored grades to multipliers. Never promotes anyone on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeRuleEngine {
    grades: BTreeMap<GradeKey, GradeDefinition>,
}

impl GradeRuleEngine {
    pub fn new(definitions: impl IntoIterator<Item = GradeDefinition>) -> Self {
        let grades = definitions
            .into_iter()
            .map(|definition| (definition.grade, definition))
            .collect();
        Self { grades }
    }

    pub fn definition(&self, grade: GradeKey) -> Option<&GradeDefinition> {
        self.grades.get(&grade)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &GradeDefinition> {
        self.grades.values()
    }

    pub fn resolve(
        &self,
        instructor_type: InstructorType,
        grade: GradeKey,
    ) -> Result<GradeResolution, FeeError> {
        let definition = self
            .grades
            .get(&grade)
            .filter(|_| grade.instructor_type() == instructor_type)
            .ok_or(FeeError::UnknownGrade {
                instructor_type,
                grade,
            })?;

        Ok(GradeResolution {
            grade,
            multiplier: definition.fee_multiplier,
            name: definition.name.clone(),
            benefits: definition.benefits.clone(),
        })
    }

    /// Promotion predicate for admin regrade proposals.
    pub fn is_eligible_for(&self, instructor: &Instructor, grade: GradeKey) -> bool {
        if grade.instructor_type() != instructor.instructor_type {
            return false;
        }

        match self.grades.get(&grade) {
            Some(definition) => {
                instructor.total_classes >= definition.min_classes
                    && instructor.rating >= definition.min_rating
            }
            None => false,
        }
    }

    /// Grades of the instructor's family they currently qualify for, highest priority first.
    pub fn eligible_grades(&self, instructor: &Instructor) -> Vec<GradeKey> {
        let mut eligible: Vec<&GradeDefinition> = self
            .grades
            .values()
            .filter(|definition| self.is_eligible_for(instructor, definition.grade))
            .collect();
        eligible.sort_by(|left, right| right.priority.cmp(&left.priority));
        eligible.into_iter().map(|definition| definition.grade).collect()
    }
}
