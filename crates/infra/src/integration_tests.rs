//! End-to-end workflow tests: services → store → bus.
//!
//! Verifies:
//! - Requisition approval and the stock transfer commit together or not at all
//! - Payment state stays consistent between visits and their invoices
//! - Dispensary stock is debited once per paid invoice
//! - Concurrent operations never oversell stock or duplicate guarded invoices

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    use clinicflow_core::{
        ConsumableItemId, DomainError, InventoryItemId, ManualClock, Money, PatientId,
        PatientProcedureId, Quantity, UserId, VisitSessionId,
    };
    use clinicflow_events::{EventBus, InMemoryEventBus};
    use clinicflow_inventory::{
        LedgerRef, NewConsumable, NewInventoryItem, NewTheaterStore, TheaterStoreType, UsageLine,
    };
    use clinicflow_invoicing::{
        InvoicePurpose, InvoiceStatus, ItemType, NewInvestigation, NewInvoiceItem, NewProcedure,
        NewTreatment, OpticsSelection, PaymentMethod, PaymentStatus,
    };
    use clinicflow_requisitions::{Priority, RequisitionDetails, RequisitionStatus};
    use clinicflow_visits::{
        BasicRefractionExam, MainExamination, TriageMeasurement, VisitPurpose, VisitStage,
        VisitStatus,
    };

    use crate::{
        BillingSource, ClinicEvent, ClinicServices, Database, NewInvoice, NewVisit,
        RequisitionLine, ServiceError, TheaterRestock, WorkflowConfig,
    };

    type Bus = Arc<InMemoryEventBus<ClinicEvent>>;

    struct Clinic {
        services: Arc<ClinicServices<Bus>>,
        clock: Arc<ManualClock>,
        bus: Bus,
        staff: UserId,
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    fn money(value: rust_decimal::Decimal) -> Money {
        Money::new(value).unwrap()
    }

    fn setup_with(config: WorkflowConfig) -> Clinic {
        let clock = Arc::new(ManualClock::new(test_time()));
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let services = ClinicServices::new(Arc::new(Database::new()), clock.clone(), bus.clone(), config);
        Clinic {
            services: Arc::new(services),
            clock,
            bus,
            staff: UserId::new(),
        }
    }

    fn setup() -> Clinic {
        setup_with(WorkflowConfig::default())
    }

    fn domain_error(result: Result<impl std::fmt::Debug, ServiceError>) -> DomainError {
        match result {
            Err(ServiceError::Domain(err)) => err,
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    impl Clinic {
        fn consumable(&self, name: &str, stock: u32) -> ConsumableItemId {
            self.services
                .create_consumable(
                    self.staff,
                    NewConsumable {
                        name: name.to_string(),
                        description: None,
                        sku: None,
                        unit_of_measure: "piece".to_string(),
                        opening_stock: Quantity::from_units(stock),
                        minimum_stock_level: Quantity::ZERO,
                        maximum_stock_level: Quantity::ZERO,
                        reorder_point: Quantity::ZERO,
                        reorder_quantity: Quantity::ZERO,
                        cost_per_unit: money(dec!(2.50)),
                        expiry_date: None,
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn dispensary_item(&self, sku: &str, stock: u32, price: rust_decimal::Decimal) -> InventoryItemId {
            self.services
                .create_inventory_item(
                    self.staff,
                    NewInventoryItem {
                        name: format!("Item {sku}"),
                        description: None,
                        sku: sku.to_string(),
                        unit_price: money(price),
                        quantity_in_stock: Quantity::from_units(stock),
                        reorder_level: Quantity::ZERO,
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn visit(&self, patient_id: PatientId, fee: Option<Money>) -> VisitSessionId {
            self.services
                .create_visit(
                    self.staff,
                    NewVisit {
                        patient_id,
                        purpose: VisitPurpose::NewConsultation,
                        consultation_fee: fee,
                        fee_already_paid: false,
                        payment_method: None,
                        payment_reference: None,
                        emergency_level: Default::default(),
                        chief_complaint: None,
                        notes: None,
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn procedure(&self) -> PatientProcedureId {
            let visit = self.visit(PatientId::new(), None);
            self.services
                .add_procedure(
                    visit,
                    self.staff,
                    NewProcedure {
                        name: "Phaco".to_string(),
                        description: None,
                        cost: money(dec!(1200)),
                        notes: None,
                    },
                )
                .unwrap()
                .id
        }

        fn general_stock(&self, item: ConsumableItemId) -> Quantity {
            self.services.consumable(item).unwrap().current_stock()
        }

        fn submitted_requisition(&self, item: ConsumableItemId, quantity: u32) -> clinicflow_core::RequisitionId {
            let requisition = self
                .services
                .create_requisition(
                    self.staff,
                    RequisitionDetails {
                        title: "Theater list".to_string(),
                        description: None,
                        department_id: None,
                        priority: Priority::High,
                        required_date: None,
                        notes: None,
                        patient_procedure_id: None,
                    },
                    vec![RequisitionLine {
                        consumable_item_id: item,
                        quantity: Quantity::from_units(quantity),
                        notes: None,
                    }],
                )
                .unwrap();
            self.services.submit_requisition(requisition.id_typed(), self.staff).unwrap();
            requisition.id_typed()
        }
    }

    #[test]
    fn approval_moves_stock_into_the_default_theater_store() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);
        let requisition_id = clinic.submitted_requisition(gauze, 30);

        let (requisition, transfer) = clinic
            .services
            .approve_requisition(requisition_id, UserId::new(), vec![], None)
            .unwrap();

        assert_eq!(requisition.status(), RequisitionStatus::Approved);
        assert_eq!(requisition.number(), "TR-2025-000001");
        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(70));

        let stores = clinic.services.theater_stores().unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].name(), "Main Theater Store");
        assert_eq!(stores[0].store_type(), TheaterStoreType::Surgical);
        assert_eq!(transfer.to_store_id(), stores[0].id_typed());

        let rows = clinic.services.theater_store_contents(stores[0].id_typed()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity_available(), Quantity::from_units(30));
        assert!(rows[0].batch_number().starts_with("REQ-"));
        assert_eq!(transfer.quantity_for(gauze), dec!(30));
        assert_eq!(clinic.services.transfers_for_requisition(requisition_id).unwrap().len(), 1);
    }

    #[test]
    fn later_transfers_merge_into_the_existing_row() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);
        let first = clinic.submitted_requisition(gauze, 30);
        clinic.services.approve_requisition(first, UserId::new(), vec![], None).unwrap();
        clinic.clock.advance(Duration::minutes(5));
        let second = clinic.submitted_requisition(gauze, 10);
        let (_, transfer) = clinic.services.approve_requisition(second, UserId::new(), vec![], None).unwrap();

        let rows = clinic.services.theater_store_contents(transfer.to_store_id()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity_available(), Quantity::from_units(40));
        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(60));
        assert_eq!(clinic.services.theater_stock_of(gauze).unwrap(), Quantity::from_units(40));
    }

    #[test]
    fn requested_quantity_must_stay_below_general_stock() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);

        let err = domain_error(clinic.services.create_requisition(
            clinic.staff,
            RequisitionDetails {
                title: "Too much".to_string(),
                description: None,
                department_id: None,
                priority: Priority::Medium,
                required_date: None,
                notes: None,
                patient_procedure_id: None,
            },
            vec![RequisitionLine {
                consumable_item_id: gauze,
                quantity: Quantity::from_units(100),
                notes: None,
            }],
        ));
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("must be less than available stock")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failed_approval_changes_nothing() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);
        let requisition_id = clinic.submitted_requisition(gauze, 60);

        // Stock drops below the approved quantity before approval.
        let procedure = clinic.procedure();
        clinic
            .services
            .record_usage(
                procedure,
                clinic.staff,
                vec![UsageLine {
                    consumable_item_id: gauze,
                    theater_store_id: None,
                    quantity: Quantity::from_units(50),
                    batch_number: None,
                    purpose: None,
                    notes: None,
                }],
            )
            .unwrap();

        let events = clinic.bus.subscribe();
        let err = domain_error(clinic.services.approve_requisition(requisition_id, UserId::new(), vec![], None));
        match err {
            DomainError::InsufficientStock(msg) => {
                assert!(msg.contains("Insufficient stock in general store for item: Gauze"));
                assert!(msg.contains("Available: 50"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(
            clinic.services.requisition(requisition_id).unwrap().status(),
            RequisitionStatus::Submitted
        );
        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(50));
        assert!(clinic.services.theater_stores().unwrap().is_empty());
        assert!(clinic.services.transfers_for_requisition(requisition_id).unwrap().is_empty());
        assert!(events.drain().is_empty());
    }

    #[test]
    fn approval_publishes_events_after_commit() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);
        let requisition_id = clinic.submitted_requisition(gauze, 30);
        let events = clinic.bus.subscribe();

        clinic.services.approve_requisition(requisition_id, clinic.staff, vec![], None).unwrap();

        let types: Vec<String> = events.drain().iter().map(|e| e.event_type().to_string()).collect();
        for expected in [
            "stock.theater_store_opened",
            "stock.debited",
            "stock.credited",
            "stock.transfer_recorded",
            "requisition.approved",
        ] {
            assert!(types.iter().any(|t| t == expected), "missing {expected} in {types:?}");
        }
    }

    #[test]
    fn usage_without_batch_takes_the_oldest_row_with_enough_stock() {
        let clinic = setup();
        let sutures = clinic.consumable("Sutures", 10);
        let store = clinic
            .services
            .create_theater_store(
                clinic.staff,
                NewTheaterStore {
                    name: "Theater 2".to_string(),
                    description: None,
                    location: None,
                    store_type: TheaterStoreType::Surgical,
                    capacity: 200,
                },
            )
            .unwrap()
            .id_typed();
        let restock = |batch: &str, qty: u32| {
            clinic
                .services
                .restock_theater_store(
                    store,
                    clinic.staff,
                    TheaterRestock {
                        consumable_item_id: sutures,
                        batch_number: batch.to_string(),
                        quantity: Quantity::from_units(qty),
                        expiry_date: None,
                    },
                )
                .unwrap()
        };
        let batch_a = restock("A", 5);
        clinic.clock.advance(Duration::seconds(1));
        let batch_b = restock("B", 20);

        let procedure = clinic.procedure();
        let line = |qty: u32| UsageLine {
            consumable_item_id: sutures,
            theater_store_id: Some(store),
            quantity: Quantity::from_units(qty),
            batch_number: None,
            purpose: None,
            notes: None,
        };

        let used = clinic.services.record_usage(procedure, clinic.staff, vec![line(10)]).unwrap();
        assert_eq!(used[0].depleted(), LedgerRef::Theater(batch_b.id_typed()));

        let used = clinic.services.record_usage(procedure, clinic.staff, vec![line(5)]).unwrap();
        assert_eq!(used[0].depleted(), LedgerRef::Theater(batch_a.id_typed()));

        let err = domain_error(clinic.services.record_usage(procedure, clinic.staff, vec![line(11)]));
        assert!(matches!(err, DomainError::InsufficientStock(_)));

        let rows = clinic.services.theater_store_contents(store).unwrap();
        let on_hand: Vec<Quantity> = rows.iter().map(|r| r.quantity_available()).collect();
        assert_eq!(on_hand, vec![Quantity::ZERO, Quantity::from_units(10)]);
        assert_eq!(clinic.services.usage_by_procedure(procedure).unwrap().len(), 2);
        assert_eq!(clinic.services.usage_by_store(store).unwrap().len(), 2);
        // The general store is untouched by theater usage.
        assert_eq!(clinic.general_stock(sutures), Quantity::from_units(10));
    }

    #[test]
    fn usage_with_unknown_batch_is_not_found_and_all_lines_roll_back() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 40);
        let store = clinic
            .services
            .create_theater_store(
                clinic.staff,
                NewTheaterStore {
                    name: "Theater 1".to_string(),
                    description: None,
                    location: None,
                    store_type: TheaterStoreType::General,
                    capacity: 50,
                },
            )
            .unwrap()
            .id_typed();
        let procedure = clinic.procedure();

        let err = domain_error(clinic.services.record_usage(
            procedure,
            clinic.staff,
            vec![
                UsageLine {
                    consumable_item_id: gauze,
                    theater_store_id: None,
                    quantity: Quantity::from_units(5),
                    batch_number: None,
                    purpose: None,
                    notes: None,
                },
                UsageLine {
                    consumable_item_id: gauze,
                    theater_store_id: Some(store),
                    quantity: Quantity::from_units(1),
                    batch_number: Some("NOPE".to_string()),
                    purpose: None,
                    notes: None,
                },
            ],
        ));

        assert!(matches!(err, DomainError::NotFound(_)));
        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(40));
        assert!(clinic.services.usage_by_item(gauze).unwrap().is_empty());
    }

    #[test]
    fn unpaid_consultation_blocks_triage_until_cashier_payment() {
        let clinic = setup();
        let visit_id = clinic.visit(PatientId::new(), Some(money(dec!(5000))));

        let visit = clinic.services.visit(visit_id).unwrap();
        assert_eq!(visit.stage(), VisitStage::Cashier);
        assert_eq!(visit.status(), VisitStatus::PaymentPending);
        let invoice_id = visit.invoice_id().unwrap();
        let invoice = clinic.services.invoice(invoice_id).unwrap();
        assert_eq!(invoice.purpose(), InvoicePurpose::ConsultationInvoice);
        assert_eq!(invoice.invoice_number(), "INV-20250602-0001");
        assert_eq!(invoice.total_amount(), money(dec!(5000)));

        let err = domain_error(clinic.services.advance_stage(visit_id, clinic.staff));
        match err {
            DomainError::PaymentRequired(msg) => assert!(msg.contains("Consultation fee not paid")),
            other => panic!("unexpected error: {other:?}"),
        }

        let visit = clinic
            .services
            .record_visit_payment(visit_id, clinic.staff, PaymentMethod::MobileMoney, Some("MM-1".to_string()))
            .unwrap();
        assert_eq!(visit.stage(), VisitStage::Triage);
        assert_eq!(visit.status(), VisitStatus::PaymentCompleted);

        let invoice = clinic.services.invoice(invoice_id).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.payment_status(), PaymentStatus::Paid);
        assert_eq!(invoice.amount_paid(), invoice.total_amount());

        let visit = clinic.services.advance_stage(visit_id, clinic.staff).unwrap();
        assert_eq!(visit.stage(), VisitStage::BasicRefractionExam);
    }

    #[test]
    fn paying_the_invoice_clears_the_visit() {
        let clinic = setup();
        let visit_id = clinic.visit(PatientId::new(), Some(money(dec!(3000))));
        let invoice_id = clinic.services.visit(visit_id).unwrap().invoice_id().unwrap();

        let partial = clinic
            .services
            .record_invoice_payment(invoice_id, clinic.staff, money(dec!(1000)), PaymentMethod::Cash, None)
            .unwrap();
        assert_eq!(partial.payment_status(), PaymentStatus::Partial);
        assert!(!clinic.services.visit(visit_id).unwrap().fee_paid());

        let err = domain_error(clinic.services.record_invoice_payment(
            invoice_id,
            clinic.staff,
            money(dec!(2500)),
            PaymentMethod::Cash,
            None,
        ));
        assert!(matches!(err, DomainError::Validation(_)));

        clinic
            .services
            .record_invoice_payment(invoice_id, clinic.staff, money(dec!(2000)), PaymentMethod::Card, None)
            .unwrap();

        let visit = clinic.services.visit(visit_id).unwrap();
        assert!(visit.fee_paid());
        assert_eq!(visit.stage(), VisitStage::Triage);
        assert_eq!(visit.payment_method(), Some(PaymentMethod::Card));
    }

    #[test]
    fn free_visit_goes_straight_to_triage_without_invoice() {
        let clinic = setup();
        let visit_id = clinic.visit(PatientId::new(), None);
        let visit = clinic.services.visit(visit_id).unwrap();

        assert_eq!(visit.stage(), VisitStage::Triage);
        assert_eq!(visit.status(), VisitStatus::Free);
        assert!(visit.invoice_id().is_none());
        assert!(clinic.services.invoices_for_visit(visit_id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_guard_blocks_same_purpose_within_window() {
        let clinic = setup();
        let patient = PatientId::new();
        let request = NewInvoice {
            patient_id: patient,
            visit_session_id: None,
            purpose: None,
            items: vec![NewInvoiceItem::simple("Eye drops", ItemType::Medication, 1, money(dec!(800)))],
            due_date: None,
            notes: None,
        };

        let first = clinic.services.create_invoice(clinic.staff, request.clone()).unwrap();
        assert_eq!(first.purpose(), InvoicePurpose::MedicationInvoice);
        assert_eq!(first.due_date(), Some((test_time() + Duration::days(30)).date_naive()));

        clinic.clock.advance(Duration::seconds(30));
        match domain_error(clinic.services.create_invoice(clinic.staff, request.clone())) {
            DomainError::Conflict(msg) => {
                assert!(msg.contains("Please wait 90 more seconds"));
                assert!(msg.contains("MEDICATION_INVOICE"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Another purpose or another patient is not affected.
        let mut other_purpose = request.clone();
        other_purpose.purpose = Some(InvoicePurpose::GeneralInvoice);
        assert!(clinic.services.create_invoice(clinic.staff, other_purpose).is_ok());
        let mut other_patient = request.clone();
        other_patient.patient_id = PatientId::new();
        assert!(clinic.services.create_invoice(clinic.staff, other_patient).is_ok());

        clinic.clock.advance(Duration::seconds(91));
        let again = clinic.services.create_invoice(clinic.staff, request).unwrap();
        assert_eq!(again.invoice_number(), "INV-20250602-0004");
    }

    #[test]
    fn failed_consultation_invoice_keeps_the_visit_and_can_be_retried() {
        let clinic = setup();
        let patient = PatientId::new();
        clinic
            .services
            .create_invoice(
                clinic.staff,
                NewInvoice {
                    patient_id: patient,
                    visit_session_id: None,
                    purpose: Some(InvoicePurpose::ConsultationInvoice),
                    items: vec![NewInvoiceItem::simple("Consultation", ItemType::Consultation, 1, money(dec!(500)))],
                    due_date: None,
                    notes: None,
                },
            )
            .unwrap();

        let visit_id = clinic.visit(patient, Some(money(dec!(5000))));
        let visit = clinic.services.visit(visit_id).unwrap();
        assert!(visit.invoice_id().is_none());
        assert_eq!(visit.status(), VisitStatus::PaymentPending);
        assert_eq!(clinic.services.visits_missing_consultation_invoice().unwrap().len(), 1);

        clinic.clock.advance(Duration::seconds(121));
        let invoice = clinic.services.retry_consultation_invoice(visit_id, clinic.staff).unwrap();
        assert_eq!(clinic.services.visit(visit_id).unwrap().invoice_id(), Some(invoice.id_typed()));
        assert!(clinic.services.visits_missing_consultation_invoice().unwrap().is_empty());

        let err = domain_error(clinic.services.retry_consultation_invoice(visit_id, clinic.staff));
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn fee_paid_at_registration_yields_a_paid_consultation_invoice() {
        let clinic = setup();
        let visit = clinic
            .services
            .create_visit(
                clinic.staff,
                NewVisit {
                    patient_id: PatientId::new(),
                    purpose: VisitPurpose::FollowUp,
                    consultation_fee: Some(money(dec!(2000))),
                    fee_already_paid: true,
                    payment_method: Some(PaymentMethod::Cash),
                    payment_reference: None,
                    emergency_level: Default::default(),
                    chief_complaint: None,
                    notes: None,
                },
            )
            .unwrap();

        assert_eq!(visit.stage(), VisitStage::Triage);
        assert_eq!(visit.status(), VisitStatus::PaymentCompleted);
        let invoice = clinic.services.invoice(visit.invoice_id().unwrap()).unwrap();
        assert!(invoice.is_paid());
        assert_eq!(invoice.payment_method(), Some(PaymentMethod::Cash));
    }

    #[test]
    fn treatment_invoice_debits_dispensary_once_on_payment() {
        let clinic = setup();
        let drops = clinic.dispensary_item("DRP-1", 10, dec!(100));
        let visit_id = clinic.visit(PatientId::new(), None);
        clinic
            .services
            .add_treatment(
                visit_id,
                clinic.staff,
                NewTreatment {
                    item_name: "Timolol drops".to_string(),
                    sku: None,
                    quantity: 3,
                    unit_price: money(dec!(100)),
                    inventory_item_id: Some(drops),
                    notes: None,
                },
            )
            .unwrap();

        let invoice = clinic
            .services
            .generate_invoice(visit_id, clinic.staff, BillingSource::Treatments)
            .unwrap();
        assert_eq!(invoice.purpose(), InvoicePurpose::TreatmentInvoiceBill);
        assert_eq!(invoice.total_amount(), money(dec!(354)));
        assert_eq!(invoice.items()[0].sku.as_deref(), Some("DRP-1"));
        // Billing alone does not touch stock.
        assert_eq!(
            clinic.services.inventory_item(drops).unwrap().quantity_in_stock(),
            Quantity::from_units(10)
        );

        let paid = clinic
            .services
            .set_invoice_status(invoice.id_typed(), clinic.staff, InvoiceStatus::Paid, Some(PaymentMethod::Cash), None)
            .unwrap();
        assert!(paid.stock_debited());
        assert_eq!(paid.amount_paid(), paid.total_amount());
        assert_eq!(
            clinic.services.inventory_item(drops).unwrap().quantity_in_stock(),
            Quantity::from_units(7)
        );

        clinic
            .services
            .set_invoice_status(invoice.id_typed(), clinic.staff, InvoiceStatus::Paid, None, None)
            .unwrap();
        assert_eq!(
            clinic.services.inventory_item(drops).unwrap().quantity_in_stock(),
            Quantity::from_units(7)
        );
    }

    #[test]
    fn short_dispensary_line_is_skipped_but_payment_stands() {
        let clinic = setup();
        let frames = clinic.dispensary_item("FRM-1", 4, dec!(250));
        let pick = || BillingSource::Optics {
            selections: vec![OpticsSelection {
                inventory_item_id: frames,
                quantity: 3,
                notes: None,
            }],
        };
        let first_visit = clinic.visit(PatientId::new(), None);
        let second_visit = clinic.visit(PatientId::new(), None);
        let first = clinic.services.generate_invoice(first_visit, clinic.staff, pick()).unwrap();
        let second = clinic.services.generate_invoice(second_visit, clinic.staff, pick()).unwrap();

        clinic
            .services
            .set_invoice_status(first.id_typed(), clinic.staff, InvoiceStatus::Paid, None, None)
            .unwrap();
        let second = clinic
            .services
            .record_invoice_payment(second.id_typed(), clinic.staff, second.total_amount(), PaymentMethod::Cash, None)
            .unwrap();

        assert!(second.is_paid());
        assert!(second.stock_debited());
        assert_eq!(
            clinic.services.inventory_item(frames).unwrap().quantity_in_stock(),
            Quantity::from_units(1)
        );
    }

    #[test]
    fn optics_invoice_requires_available_stock() {
        let clinic = setup();
        let lenses = clinic.dispensary_item("LNS-1", 2, dec!(90));
        let visit_id = clinic.visit(PatientId::new(), None);

        let err = domain_error(clinic.services.generate_invoice(
            visit_id,
            clinic.staff,
            BillingSource::Optics {
                selections: vec![OpticsSelection {
                    inventory_item_id: lenses,
                    quantity: 5,
                    notes: None,
                }],
            },
        ));
        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert!(clinic.services.invoices_for_visit(visit_id).unwrap().is_empty());
    }

    #[test]
    fn investigations_are_billed_once() {
        let clinic = setup();
        let visit_id = clinic.visit(PatientId::new(), None);
        for name in ["OCT scan", "Visual field"] {
            clinic
                .services
                .add_investigation(
                    visit_id,
                    clinic.staff,
                    NewInvestigation {
                        name: name.to_string(),
                        quantity: 1,
                        cost: money(dec!(1000)),
                        notes: None,
                    },
                )
                .unwrap();
        }

        let invoice = clinic
            .services
            .generate_invoice(visit_id, clinic.staff, BillingSource::Investigations { investigation_ids: None })
            .unwrap();
        assert_eq!(invoice.items().len(), 2);
        assert!(clinic.services.investigations_for_visit(visit_id).unwrap().iter().all(|i| i.billed));

        clinic.clock.advance(Duration::seconds(300));
        let err = domain_error(clinic.services.generate_invoice(
            visit_id,
            clinic.staff,
            BillingSource::Investigations { investigation_ids: None },
        ));
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("No unbilled investigations")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn deleting_the_consultation_invoice_archives_and_unlinks_it() {
        let clinic = setup();
        let visit_id = clinic.visit(PatientId::new(), Some(money(dec!(5000))));
        let invoice_id = clinic.services.visit(visit_id).unwrap().invoice_id().unwrap();

        let archived = clinic.services.delete_invoice(invoice_id, clinic.staff).unwrap();
        assert_eq!(archived.original_invoice_id, invoice_id);
        assert_eq!(archived.invoice_purpose, InvoicePurpose::ConsultationInvoice);
        assert!(archived.items_json.contains("Consultation Fee"));

        assert!(matches!(
            domain_error(clinic.services.invoice(invoice_id)),
            DomainError::NotFound(_)
        ));
        assert!(clinic.services.visit(visit_id).unwrap().invoice_id().is_none());
        assert_eq!(clinic.services.deleted_invoices().unwrap().len(), 1);
        assert!(matches!(
            domain_error(clinic.services.advance_stage(visit_id, clinic.staff)),
            DomainError::PaymentRequired(_)
        ));
    }

    #[test]
    fn clinical_records_walk_the_visit_through_its_stages() {
        let clinic = setup();
        let visit_id = clinic.visit(PatientId::new(), None);

        clinic
            .services
            .create_triage(
                visit_id,
                clinic.staff,
                TriageMeasurement {
                    systolic_bp: Some(120),
                    diastolic_bp: Some(80),
                    ..TriageMeasurement::default()
                },
            )
            .unwrap();
        assert_eq!(clinic.services.visit(visit_id).unwrap().stage(), VisitStage::BasicRefractionExam);

        let duplicate = domain_error(clinic.services.create_triage(visit_id, clinic.staff, TriageMeasurement::default()));
        match duplicate {
            DomainError::Conflict(msg) => assert!(msg.contains("Triage measurement already exists")),
            other => panic!("unexpected error: {other:?}"),
        }

        let exam = MainExamination {
            diagnosis: Some("Cataract".to_string()),
            ..MainExamination::default()
        };
        let early = domain_error(clinic.services.create_main_examination(visit_id, clinic.staff, exam.clone()));
        assert!(matches!(early, DomainError::Validation(_)));

        clinic
            .services
            .create_basic_refraction(visit_id, clinic.staff, BasicRefractionExam::default())
            .unwrap();
        clinic.services.create_main_examination(visit_id, clinic.staff, exam).unwrap();

        let visit = clinic.services.visit(visit_id).unwrap();
        assert_eq!(visit.stage(), VisitStage::Pharmacy);
        let stored = clinic
            .services
            .clinical_record_for_visit::<MainExamination>(visit_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.data.diagnosis.as_deref(), Some("Cataract"));

        let visit = clinic.services.complete_visit(visit_id, clinic.staff).unwrap();
        assert_eq!(visit.stage(), VisitStage::Completed);
    }

    #[test]
    fn cancelled_visit_is_frozen() {
        let clinic = setup();
        let visit_id = clinic.visit(PatientId::new(), Some(money(dec!(1000))));
        let visit = clinic
            .services
            .cancel_visit(visit_id, clinic.staff, Some("patient left".to_string()))
            .unwrap();
        assert_eq!(visit.status(), VisitStatus::Cancelled);

        assert!(matches!(
            domain_error(clinic.services.advance_stage(visit_id, clinic.staff)),
            DomainError::Conflict(_)
        ));
        assert!(matches!(
            domain_error(clinic.services.record_visit_payment(visit_id, clinic.staff, PaymentMethod::Cash, None)),
            DomainError::Conflict(_)
        ));
    }

    #[test]
    fn concurrent_usage_never_oversells_general_stock() {
        let clinic = setup_with(WorkflowConfig::default().with_commit_attempts(10_000));
        let gauze = clinic.consumable("Gauze", 100);
        let procedure = clinic.procedure();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let services = Arc::clone(&clinic.services);
                let staff = clinic.staff;
                thread::spawn(move || {
                    services.record_usage(
                        procedure,
                        staff,
                        vec![UsageLine {
                            consumable_item_id: gauze,
                            theater_store_id: None,
                            quantity: Quantity::from_units(15),
                            batch_number: None,
                            purpose: None,
                            notes: None,
                        }],
                    )
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => succeeded += 1,
                Err(ServiceError::Domain(DomainError::InsufficientStock(_))) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(succeeded, 6);
        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(10));
        assert_eq!(clinic.services.usage_by_item(gauze).unwrap().len(), 6);
    }

    #[test]
    fn concurrent_guarded_creations_admit_exactly_one() {
        let clinic = setup_with(WorkflowConfig::default().with_commit_attempts(10_000));
        let patient = PatientId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let services = Arc::clone(&clinic.services);
                let staff = clinic.staff;
                thread::spawn(move || {
                    services.create_invoice(
                        staff,
                        NewInvoice {
                            patient_id: patient,
                            visit_session_id: None,
                            purpose: Some(InvoicePurpose::GeneralInvoice),
                            items: vec![NewInvoiceItem::simple("Report", ItemType::Other, 1, Money::new(dec!(50)).unwrap())],
                            due_date: None,
                            notes: None,
                        },
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, ServiceError::Domain(DomainError::Conflict(_)))));
    }

    #[test]
    fn concurrent_invoice_numbers_are_unique() {
        let clinic = setup_with(WorkflowConfig::default().with_commit_attempts(10_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let services = Arc::clone(&clinic.services);
                let staff = clinic.staff;
                thread::spawn(move || {
                    services
                        .create_invoice(
                            staff,
                            NewInvoice {
                                patient_id: PatientId::new(),
                                visit_session_id: None,
                                purpose: None,
                                items: vec![NewInvoiceItem::simple("Report", ItemType::Other, 1, Money::new(dec!(50)).unwrap())],
                                due_date: None,
                                notes: None,
                            },
                        )
                        .unwrap()
                        .invoice_number()
                        .to_string()
                })
            })
            .collect();

        let mut numbers: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        numbers.sort();
        let expected: Vec<String> = (1..=8).map(|n| format!("INV-20250602-{n:04}")).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn concurrent_approvals_of_one_item_never_overdraw_the_general_store() {
        let clinic = setup_with(WorkflowConfig::default().with_commit_attempts(10_000));
        let gauze = clinic.consumable("Gauze", 100);
        let requisitions = [
            clinic.submitted_requisition(gauze, 60),
            clinic.submitted_requisition(gauze, 60),
        ];

        let handles: Vec<_> = requisitions
            .into_iter()
            .map(|id| {
                let services = Arc::clone(&clinic.services);
                thread::spawn(move || services.approve_requisition(id, UserId::new(), vec![], None))
            })
            .collect();

        let mut approved = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => approved += 1,
                Err(ServiceError::Domain(DomainError::InsufficientStock(msg))) => {
                    assert!(msg.contains("Available: 40"));
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(approved, 1);
        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(40));
        assert_eq!(clinic.services.theater_stock_of(gauze).unwrap(), Quantity::from_units(60));
        let statuses: Vec<_> = requisitions
            .iter()
            .map(|id| clinic.services.requisition(*id).unwrap().status())
            .collect();
        assert!(statuses.contains(&RequisitionStatus::Approved));
        assert!(statuses.contains(&RequisitionStatus::Submitted));
    }

    #[test]
    fn racing_payments_and_mark_paid_debit_the_dispensary_once() {
        let clinic = setup_with(WorkflowConfig::default().with_commit_attempts(10_000));
        let drops = clinic.dispensary_item("DRP-2", 10, dec!(50));
        let mut line = NewInvoiceItem::simple("Timolol drops", ItemType::Treatment, 2, money(dec!(50)));
        line.inventory_item_id = Some(drops);
        let invoice = clinic
            .services
            .create_invoice(
                clinic.staff,
                NewInvoice {
                    patient_id: PatientId::new(),
                    visit_session_id: None,
                    purpose: None,
                    items: vec![line],
                    due_date: None,
                    notes: None,
                },
            )
            .unwrap();
        assert_eq!(invoice.total_amount(), money(dec!(100)));
        let invoice_id = invoice.id_typed();

        let payments: Vec<_> = (0..2)
            .map(|_| {
                let services = Arc::clone(&clinic.services);
                let staff = clinic.staff;
                thread::spawn(move || {
                    services.record_invoice_payment(invoice_id, staff, money(dec!(50)), PaymentMethod::Cash, None)
                })
            })
            .collect();
        let mark_paid = {
            let services = Arc::clone(&clinic.services);
            let staff = clinic.staff;
            thread::spawn(move || {
                services.set_invoice_status(invoice_id, staff, InvoiceStatus::Paid, Some(PaymentMethod::Cash), None)
            })
        };

        mark_paid.join().unwrap().unwrap();
        for handle in payments {
            // A payment that lands after the invoice is settled is refused.
            match handle.join().unwrap() {
                Ok(_) | Err(ServiceError::Domain(DomainError::Conflict(_))) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        let invoice = clinic.services.invoice(invoice_id).unwrap();
        assert!(invoice.is_paid());
        assert!(invoice.stock_debited());
        assert_eq!(invoice.amount_paid(), money(dec!(100)));
        assert_eq!(
            clinic.services.inventory_item(drops).unwrap().quantity_in_stock(),
            Quantity::from_units(8)
        );
    }

    #[test]
    fn a_short_later_line_rolls_back_the_whole_approval() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);
        let tape = clinic.consumable("Tape", 50);
        let line = |item, units| RequisitionLine {
            consumable_item_id: item,
            quantity: Quantity::from_units(units),
            notes: None,
        };
        let requisition_id = clinic
            .services
            .create_requisition(
                clinic.staff,
                RequisitionDetails {
                    title: "Cataract list".to_string(),
                    description: None,
                    department_id: None,
                    priority: Priority::High,
                    required_date: None,
                    notes: None,
                    patient_procedure_id: None,
                },
                vec![line(gauze, 30), line(tape, 20)],
            )
            .unwrap()
            .id_typed();
        clinic.services.submit_requisition(requisition_id, clinic.staff).unwrap();

        let procedure = clinic.procedure();
        clinic
            .services
            .record_usage(
                procedure,
                clinic.staff,
                vec![UsageLine {
                    consumable_item_id: tape,
                    theater_store_id: None,
                    quantity: Quantity::from_units(40),
                    batch_number: None,
                    purpose: None,
                    notes: None,
                }],
            )
            .unwrap();

        let err = domain_error(clinic.services.approve_requisition(requisition_id, UserId::new(), vec![], None));
        match err {
            DomainError::InsufficientStock(msg) => assert!(msg.contains("Tape")),
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(100));
        assert_eq!(clinic.general_stock(tape), Quantity::from_units(10));
        assert!(clinic.services.theater_stores().unwrap().is_empty());
        assert_eq!(
            clinic.services.requisition(requisition_id).unwrap().status(),
            RequisitionStatus::Submitted
        );
    }

    #[test]
    fn deactivated_store_is_skipped_by_later_transfers() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);
        let first = clinic.submitted_requisition(gauze, 10);
        let (_, transfer) = clinic.services.approve_requisition(first, UserId::new(), vec![], None).unwrap();
        let main = transfer.to_store_id();

        let closed = clinic.services.deactivate_theater_store(main, clinic.staff).unwrap();
        assert!(!closed.is_active());
        assert!(matches!(
            domain_error(clinic.services.deactivate_theater_store(main, clinic.staff)),
            DomainError::Conflict(_)
        ));

        let second = clinic.submitted_requisition(gauze, 10);
        let err = domain_error(clinic.services.approve_requisition(second, UserId::new(), vec![], Some(main)));
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("is not active")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(clinic.general_stock(gauze), Quantity::from_units(90));

        let restock = clinic.services.restock_theater_store(
            main,
            clinic.staff,
            TheaterRestock {
                consumable_item_id: gauze,
                batch_number: "B-1".to_string(),
                quantity: Quantity::from_units(5),
                expiry_date: None,
            },
        );
        assert!(matches!(domain_error(restock), DomainError::Validation(_)));

        clinic.clock.advance(Duration::minutes(1));
        let annex = clinic
            .services
            .create_theater_store(
                clinic.staff,
                NewTheaterStore {
                    name: "Annex".to_string(),
                    description: None,
                    location: None,
                    store_type: TheaterStoreType::Surgical,
                    capacity: 50,
                },
            )
            .unwrap();
        let (_, transfer) = clinic.services.approve_requisition(second, UserId::new(), vec![], None).unwrap();
        assert_eq!(transfer.to_store_id(), annex.id_typed());
        assert_eq!(clinic.services.theater_stores().unwrap().len(), 2);
    }

    #[test]
    fn deactivating_the_only_store_opens_a_fresh_default() {
        let clinic = setup();
        let gauze = clinic.consumable("Gauze", 100);
        let first = clinic.submitted_requisition(gauze, 10);
        let (_, transfer) = clinic.services.approve_requisition(first, UserId::new(), vec![], None).unwrap();
        let main = transfer.to_store_id();
        clinic.services.deactivate_theater_store(main, clinic.staff).unwrap();

        let second = clinic.submitted_requisition(gauze, 10);
        let (_, transfer) = clinic.services.approve_requisition(second, UserId::new(), vec![], None).unwrap();

        assert_ne!(transfer.to_store_id(), main);
        let fresh = clinic.services.theater_store(transfer.to_store_id()).unwrap();
        assert!(fresh.is_active());
        assert_eq!(fresh.name(), "Main Theater Store");
        assert_eq!(clinic.services.theater_stores().unwrap().len(), 2);
    }

    mod conservation {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 24, ..ProptestConfig::default() })]

            #[test]
            fn transfers_conserve_total_stock(
                requests in proptest::collection::vec((0usize..2, 1u32..40), 1..10),
            ) {
                let clinic = setup();
                let items = [clinic.consumable("Gauze", 120), clinic.consumable("Tape", 60)];
                let opening = [Quantity::from_units(120), Quantity::from_units(60)];

                for (pick, units) in requests {
                    let item = items[pick];
                    if Quantity::from_units(units) >= clinic.general_stock(item) {
                        continue;
                    }
                    let id = clinic.submitted_requisition(item, units);
                    clinic.services.approve_requisition(id, UserId::new(), vec![], None).unwrap();

                    for (item, opening) in items.iter().zip(opening) {
                        let general = clinic.general_stock(*item);
                        let theater = clinic.services.theater_stock_of(*item).unwrap();
                        prop_assert_eq!(general.checked_add(theater).unwrap(), opening);
                    }
                }
            }
        }
    }
}
