//! Infrastructure layer: the transactional store (in-process, optionally
//! written through to Postgres), the clinic event type, and the application
//! services that run every workflow operation.

pub mod config;
pub mod error;
pub mod events;
pub mod services;
pub mod store;

mod integration_tests;

pub use config::WorkflowConfig;
pub use error::{ServiceError, ServiceResult};
pub use events::ClinicEvent;
pub use services::{
    BillingSource, ClinicEnvelope, ClinicServices, ClinicalTable, NewInvoice, NewVisit,
    RequisitionLine, TheaterRestock,
};
pub use store::postgres::{PostgresConfig, PostgresStore};
pub use store::{Database, DurableStore, StoreError};
