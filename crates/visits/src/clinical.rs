//! One-per-visit clinical records: triage measurement, basic refraction exam,
//! and main examination.
//!
//! Each record may only be created while the session sits at the record's
//! stage; creation pushes the session forward by exactly one stage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clinicflow_core::{ClinicalRecordId, DomainError, DomainResult, PatientId, UserId, VisitSessionId};

use crate::stage::VisitStage;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalRecordKind {
    Triage,
    BasicRefraction,
    MainExamination,
}

impl ClinicalRecordKind {
    /// Stage the session must be at when the record is created.
    pub fn required_stage(self) -> VisitStage {
        match self {
            ClinicalRecordKind::Triage => VisitStage::Triage,
            ClinicalRecordKind::BasicRefraction => VisitStage::BasicRefractionExam,
            ClinicalRecordKind::MainExamination => VisitStage::DoctorVisit,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ClinicalRecordKind::Triage => "Triage measurement",
            ClinicalRecordKind::BasicRefraction => "Basic refraction exam",
            ClinicalRecordKind::MainExamination => "Main examination",
        }
    }
}

/// Payload of a clinical record.
pub trait ClinicalData: Clone {
    const KIND: ClinicalRecordKind;

    fn validate(&self) -> DomainResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalRecord<T> {
    pub id: ClinicalRecordId,
    pub visit_session_id: VisitSessionId,
    pub patient_id: PatientId,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
    pub data: T,
}

impl<T: ClinicalData> ClinicalRecord<T> {
    pub fn create(
        id: ClinicalRecordId,
        visit_session_id: VisitSessionId,
        patient_id: PatientId,
        recorded_by: UserId,
        data: T,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        data.validate()?;
        Ok(Self {
            id,
            visit_session_id,
            patient_id,
            recorded_by,
            recorded_at: at,
            data,
        })
    }

    pub fn kind(&self) -> ClinicalRecordKind {
        T::KIND
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageMeasurement {
    pub systolic_bp: Option<u16>,
    pub diastolic_bp: Option<u16>,
    pub rbs_value: Option<Decimal>,
    pub rbs_unit: Option<String>,
    pub iop_right: Option<u16>,
    pub iop_left: Option<u16>,
    pub weight_kg: Option<Decimal>,
    pub notes: Option<String>,
}

impl ClinicalData for TriageMeasurement {
    const KIND: ClinicalRecordKind = ClinicalRecordKind::Triage;

    fn validate(&self) -> DomainResult<()> {
        if let (Some(sys), Some(dia)) = (self.systolic_bp, self.diastolic_bp) {
            if dia >= sys {
                return Err(DomainError::validation(format!(
                    "diastolic pressure ({dia}) must be below systolic pressure ({sys})"
                )));
            }
        }
        for value in [self.rbs_value, self.weight_kg].into_iter().flatten() {
            if value.is_sign_negative() {
                return Err(DomainError::validation("measurements must not be negative"));
            }
        }
        Ok(())
    }
}

/// Sphere / cylinder / axis for one eye.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeRefraction {
    pub sphere: Option<String>,
    pub cylinder: Option<String>,
    pub axis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicRefractionExam {
    pub visual_acuity_right: Option<String>,
    pub visual_acuity_left: Option<String>,
    pub pupils_perrl: Option<bool>,
    pub manifest_right: EyeRefraction,
    pub manifest_left: EyeRefraction,
    pub keratometry_right: Option<String>,
    pub keratometry_left: Option<String>,
    pub notes: Option<String>,
}

impl ClinicalData for BasicRefractionExam {
    const KIND: ClinicalRecordKind = ClinicalRecordKind::BasicRefraction;

    fn validate(&self) -> DomainResult<()> {
        for axis in [&self.manifest_right.axis, &self.manifest_left.axis].into_iter().flatten() {
            match axis.trim().parse::<u16>() {
                Ok(deg) if deg <= 180 => {}
                _ => {
                    return Err(DomainError::validation(format!(
                        "axis must be a whole number of degrees between 0 and 180 (got {axis})"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MainExamination {
    pub chief_complaint: Option<String>,
    pub history: Option<String>,
    pub slit_lamp_findings: Option<String>,
    pub fundus_findings: Option<String>,
    pub diagnosis: Option<String>,
    pub plan: Option<String>,
    pub notes: Option<String>,
}

impl ClinicalData for MainExamination {
    const KIND: ClinicalRecordKind = ClinicalRecordKind::MainExamination;

    fn validate(&self) -> DomainResult<()> {
        let has_content = [&self.chief_complaint, &self.diagnosis, &self.plan]
            .into_iter()
            .flatten()
            .any(|s| !s.trim().is_empty());
        if !has_content {
            return Err(DomainError::validation(
                "main examination needs a chief complaint, diagnosis, or plan",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn each_kind_belongs_to_one_stage() {
        assert_eq!(ClinicalRecordKind::Triage.required_stage(), VisitStage::Triage);
        assert_eq!(
            ClinicalRecordKind::BasicRefraction.required_stage(),
            VisitStage::BasicRefractionExam
        );
        assert_eq!(ClinicalRecordKind::MainExamination.required_stage(), VisitStage::DoctorVisit);
    }

    #[test]
    fn triage_rejects_inverted_blood_pressure() {
        let data = TriageMeasurement {
            systolic_bp: Some(80),
            diastolic_bp: Some(120),
            ..TriageMeasurement::default()
        };
        let at = Utc.with_ymd_and_hms(2025, 2, 2, 9, 0, 0).unwrap();
        let err = ClinicalRecord::create(
            ClinicalRecordId::new(),
            VisitSessionId::new(),
            PatientId::new(),
            UserId::new(),
            data,
            at,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn refraction_axis_must_be_in_range() {
        let mut exam = BasicRefractionExam::default();
        exam.manifest_right.axis = Some("90".to_string());
        assert!(exam.validate().is_ok());
        exam.manifest_left.axis = Some("270".to_string());
        assert!(exam.validate().is_err());
    }

    #[test]
    fn empty_main_examination_is_rejected() {
        assert!(MainExamination::default().validate().is_err());
        let exam = MainExamination {
            diagnosis: Some("Senile cataract, right eye".to_string()),
            ..MainExamination::default()
        };
        assert!(exam.validate().is_ok());
    }
}
