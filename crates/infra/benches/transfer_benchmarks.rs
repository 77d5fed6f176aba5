use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{TimeZone, Utc};
use clinicflow_core::{ConsumableItemId, ManualClock, Money, PatientId, Quantity, UserId};
use clinicflow_events::InMemoryEventBus;
use clinicflow_infra::{ClinicEvent, ClinicServices, Database, NewInvoice, RequisitionLine, WorkflowConfig};
use clinicflow_inventory::{NewConsumable, NewTheaterStore, TheaterStoreType, UsageLine};
use clinicflow_invoicing::{ItemType, NewInvoiceItem, NewProcedure};
use clinicflow_requisitions::{Priority, RequisitionDetails};
use rust_decimal_macros::dec;
use std::sync::Arc;

type Services = ClinicServices<Arc<InMemoryEventBus<ClinicEvent>>>;

fn services() -> Services {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()));
    ClinicServices::new(
        Arc::new(Database::new()),
        clock,
        Arc::new(InMemoryEventBus::new()),
        WorkflowConfig::default(),
    )
}

fn consumable(services: &Services, staff: UserId, name: &str, stock: u32) -> ConsumableItemId {
    services
        .create_consumable(
            staff,
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
                cost_per_unit: Money::new(dec!(1.25)).unwrap(),
                expiry_date: None,
            },
        )
        .unwrap()
        .id_typed()
}

fn details() -> RequisitionDetails {
    RequisitionDetails {
        title: "Bench list".to_string(),
        description: None,
        department_id: None,
        priority: Priority::Medium,
        required_date: None,
        notes: None,
        patient_procedure_id: None,
    }
}

/// Create, submit and approve one requisition per iteration.
fn bench_requisition_approval(c: &mut Criterion) {
    let mut group = c.benchmark_group("requisition_approval");

    for line_count in [1usize, 5, 20].iter() {
        group.throughput(Throughput::Elements(*line_count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(line_count), line_count, |b, &line_count| {
            let services = services();
            let staff = UserId::new();
            let items: Vec<ConsumableItemId> = (0..line_count)
                .map(|i| consumable(&services, staff, &format!("Item {i}"), u32::MAX / 2))
                .collect();

            b.iter(|| {
                let lines = items
                    .iter()
                    .map(|item| RequisitionLine {
                        consumable_item_id: *item,
                        quantity: Quantity::from_units(1),
                        notes: None,
                    })
                    .collect();
                let requisition = services.create_requisition(staff, details(), lines).unwrap();
                services.submit_requisition(requisition.id_typed(), staff).unwrap();
                black_box(
                    services
                        .approve_requisition(requisition.id_typed(), staff, Vec::new(), None)
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

/// FIFO depletion cost grows with the number of batches held for an item.
fn bench_fifo_usage(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_usage");

    for batches in [1u32, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batches), batches, |b, &batches| {
            let services = services();
            let staff = UserId::new();
            let item = consumable(&services, staff, "Sutures", 10);
            let store = services
                .create_theater_store(
                    staff,
                    NewTheaterStore {
                        name: "Bench theater".to_string(),
                        description: None,
                        location: None,
                        store_type: TheaterStoreType::Surgical,
                        capacity: u32::MAX,
                    },
                )
                .unwrap()
                .id_typed();
            for batch in 0..batches {
                services
                    .restock_theater_store(
                        store,
                        staff,
                        clinicflow_infra::TheaterRestock {
                            consumable_item_id: item,
                            batch_number: format!("B{batch:04}"),
                            quantity: Quantity::from_units(u32::MAX / 4),
                            expiry_date: None,
                        },
                    )
                    .unwrap();
            }
            let visit = services
                .create_visit(
                    staff,
                    clinicflow_infra::NewVisit {
                        patient_id: PatientId::new(),
                        purpose: clinicflow_visits::VisitPurpose::Surgery,
                        consultation_fee: None,
                        fee_already_paid: false,
                        payment_method: None,
                        payment_reference: None,
                        emergency_level: Default::default(),
                        chief_complaint: None,
                        notes: None,
                    },
                )
                .unwrap()
                .id_typed();
            let procedure = services
                .add_procedure(
                    visit,
                    staff,
                    NewProcedure {
                        name: "Phaco".to_string(),
                        description: None,
                        cost: Money::new(dec!(100)).unwrap(),
                        notes: None,
                    },
                )
                .unwrap()
                .id;

            b.iter(|| {
                black_box(
                    services
                        .record_usage(
                            procedure,
                            staff,
                            vec![UsageLine {
                                consumable_item_id: item,
                                theater_store_id: Some(store),
                                quantity: Quantity::from_units(1),
                                batch_number: None,
                                purpose: None,
                                notes: None,
                            }],
                        )
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

fn bench_invoice_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_creation");
    group.sample_size(1000);

    group.bench_function("single_line_new_patient", |b| {
        let services = services();
        let staff = UserId::new();
        b.iter(|| {
            black_box(
                services
                    .create_invoice(
                        staff,
                        NewInvoice {
                            patient_id: PatientId::new(),
                            visit_session_id: None,
                            purpose: None,
                            items: vec![NewInvoiceItem::simple(
                                "Eye drops",
                                ItemType::Medication,
                                2,
                                Money::new(dec!(450)).unwrap(),
                            )],
                            due_date: None,
                            notes: None,
                        },
                    )
                    .unwrap(),
            );
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_requisition_approval,
    bench_fifo_usage,
    bench_invoice_creation
);
criterion_main!(benches);
