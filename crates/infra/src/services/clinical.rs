//! Clinical records. Creating one completes the session's current stage.

use tracing::{info, instrument};

use clinicflow_core::{Aggregate, ClinicalRecordId, DomainError, UserId, VisitSessionId};
use clinicflow_events::EventBus;
use clinicflow_visits::{
    BasicRefractionExam, ClinicalData, ClinicalRecord, CompleteClinicalStage, MainExamination,
    TriageMeasurement, VisitCommand,
};

use super::visits::{load_visit, save_visit};
use super::{ClinicEnvelope, ClinicServices};
use crate::error::ServiceResult;
use crate::events::ClinicEvent;
use crate::store::{Table, TableTx, Tables, Transaction};

/// Where records of one clinical payload type are stored.
pub trait ClinicalTable: ClinicalData + Sized {
    fn staged<'t>(tx: &'t mut Transaction<'_>) -> TableTx<'t, ClinicalRecordId, ClinicalRecord<Self>>;

    fn committed(tables: &Tables) -> &Table<ClinicalRecordId, ClinicalRecord<Self>>;
}

impl ClinicalTable for TriageMeasurement {
    fn staged<'t>(tx: &'t mut Transaction<'_>) -> TableTx<'t, ClinicalRecordId, ClinicalRecord<Self>> {
        tx.triage()
    }

    fn committed(tables: &Tables) -> &Table<ClinicalRecordId, ClinicalRecord<Self>> {
        &tables.triage
    }
}

impl ClinicalTable for BasicRefractionExam {
    fn staged<'t>(tx: &'t mut Transaction<'_>) -> TableTx<'t, ClinicalRecordId, ClinicalRecord<Self>> {
        tx.refraction()
    }

    fn committed(tables: &Tables) -> &Table<ClinicalRecordId, ClinicalRecord<Self>> {
        &tables.refraction
    }
}

impl ClinicalTable for MainExamination {
    fn staged<'t>(tx: &'t mut Transaction<'_>) -> TableTx<'t, ClinicalRecordId, ClinicalRecord<Self>> {
        tx.main_exams()
    }

    fn committed(tables: &Tables) -> &Table<ClinicalRecordId, ClinicalRecord<Self>> {
        &tables.main_exams
    }
}

impl<B> ClinicServices<B>
where
    B: EventBus<ClinicEnvelope>,
{
    /// Record `data` for the visit and advance it past the record's stage.
    #[instrument(skip_all, fields(visit_session_id = %session_id, kind = ?T::KIND), err)]
    pub fn create_clinical_record<T: ClinicalTable>(
        &self,
        session_id: VisitSessionId,
        actor: UserId,
        data: T,
    ) -> ServiceResult<ClinicalRecord<T>> {
        let now = self.now();
        let record = self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            let index_key = (session_id, T::KIND);
            if tx.clinical_index().get(&index_key)?.is_some() {
                return Err(DomainError::conflict(format!(
                    "{} already exists for visit session {session_id}",
                    T::KIND.label()
                ))
                .into());
            }
            let patient_id = session
                .patient_id()
                .ok_or_else(|| DomainError::invariant(format!("visit session {session_id} has no patient")))?;

            let events = session.execute(&VisitCommand::CompleteClinicalStage(CompleteClinicalStage {
                session_id,
                kind: T::KIND,
                occurred_at: now,
            }))?;
            let record = ClinicalRecord::create(ClinicalRecordId::new(), session_id, patient_id, actor, data.clone(), now)?;

            T::staged(tx).put(record.id, record.clone())?;
            tx.clinical_index().put(index_key, record.id)?;
            save_visit(tx, &session, events)?;
            tx.record(
                record.id,
                ClinicEvent::ClinicalRecordCreated {
                    record_id: record.id,
                    visit_session_id: session_id,
                    kind: T::KIND,
                    recorded_by: actor,
                    occurred_at: now,
                },
            );
            Ok(record)
        })?;
        info!(visit_session_id = %session_id, kind = T::KIND.label(), "clinical record created");
        Ok(record)
    }

    pub fn create_triage(
        &self,
        session_id: VisitSessionId,
        actor: UserId,
        data: TriageMeasurement,
    ) -> ServiceResult<ClinicalRecord<TriageMeasurement>> {
        self.create_clinical_record(session_id, actor, data)
    }

    pub fn create_basic_refraction(
        &self,
        session_id: VisitSessionId,
        actor: UserId,
        data: BasicRefractionExam,
    ) -> ServiceResult<ClinicalRecord<BasicRefractionExam>> {
        self.create_clinical_record(session_id, actor, data)
    }

    pub fn create_main_examination(
        &self,
        session_id: VisitSessionId,
        actor: UserId,
        data: MainExamination,
    ) -> ServiceResult<ClinicalRecord<MainExamination>> {
        self.create_clinical_record(session_id, actor, data)
    }

    /// The visit's record of type `T`, if one was created.
    pub fn clinical_record_for_visit<T: ClinicalTable>(
        &self,
        session_id: VisitSessionId,
    ) -> ServiceResult<Option<ClinicalRecord<T>>> {
        self.view(|t| {
            t.clinical_index
                .get(&(session_id, T::KIND))
                .and_then(|id| T::committed(t).get(id))
                .cloned()
        })
    }
}
