use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use std::sync::Arc;

use orgflow_core::{ActorId, ExpectedVersion, StreamId};
use orgflow_events::{EventMetadata, NewEvent, TraceContext};
use orgflow_infra::event_store::{EventStore, InMemoryEventStore};
use orgflow_infra::projections::{AccessGrantsProjection, OrganizationsProjection};
use orgflow_infra::read_model::InMemoryProjectionStore;
use orgflow_infra::router::EventRouter;
use orgflow_orgs::catalog::{ORGANIZATION_CREATED, STREAM_ORGANIZATION};
use orgflow_orgs::OrganizationCreated;

fn created_event(stream_id: StreamId) -> NewEvent {
    let payload = OrganizationCreated {
        organization_id: stream_id,
        name: "Bench Org".to_string(),
        slug: "bench-org".to_string(),
        owner: ActorId::new(),
    };
    NewEvent::new(
        stream_id,
        STREAM_ORGANIZATION,
        ORGANIZATION_CREATED,
        serde_json::to_value(&payload).unwrap(),
        EventMetadata::from_trace(&TraceContext::root()),
    )
}

fn bench_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_throughput");
    group.throughput(Throughput::Elements(1));

    group.bench_function("append_fresh_stream", |b| {
        let store = InMemoryEventStore::new();
        b.iter(|| {
            let event = created_event(StreamId::new());
            store
                .append(black_box(event), ExpectedVersion::NoStream)
                .unwrap()
        });
    });

    group.bench_function("append_growing_stream", |b| {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new();
        b.iter(|| {
            let event = created_event(stream);
            store
                .append(black_box(event), ExpectedVersion::Any)
                .unwrap()
        });
    });

    group.finish();
}

fn bench_router_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("dispatch_organization_created", |b| {
        let store = Arc::new(InMemoryEventStore::new());
        let router = EventRouter::new(Arc::clone(&store)).register(Box::new(
            OrganizationsProjection::new(
                Arc::new(InMemoryProjectionStore::new()),
                Arc::new(InMemoryProjectionStore::new()),
            ),
        ));
        b.iter(|| {
            let stored = store
                .append(created_event(StreamId::new()), ExpectedVersion::NoStream)
                .unwrap();
            router.dispatch(black_box(&stored)).unwrap()
        });
    });

    group.finish();
}

fn bench_projection_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_query");

    group.bench_function("active_for_partnership_1k_grants", |b| {
        use orgflow_orgs::catalog::{ACCESS_GRANT_ISSUED, STREAM_ACCESS_GRANT};
        use orgflow_orgs::{AccessGrantIssued, GrantScope};

        let store = Arc::new(InMemoryEventStore::new());
        let grants = AccessGrantsProjection::new(Arc::new(InMemoryProjectionStore::new()));
        let partnership_id = StreamId::new();
        for i in 0..1_000u32 {
            let grant_id = StreamId::new();
            let payload = AccessGrantIssued {
                grant_id,
                // Every tenth grant belongs to the queried partnership.
                partnership_id: if i % 10 == 0 {
                    partnership_id
                } else {
                    StreamId::new()
                },
                organization_id: StreamId::new(),
                grantee: ActorId::new(),
                scope: GrantScope::ReadOnly,
            };
            let stored = store
                .append(
                    NewEvent::new(
                        grant_id,
                        STREAM_ACCESS_GRANT,
                        ACCESS_GRANT_ISSUED,
                        serde_json::to_value(&payload).unwrap(),
                        EventMetadata::from_trace(&TraceContext::root()),
                    ),
                    ExpectedVersion::NoStream,
                )
                .unwrap();
            use orgflow_infra::router::EventProcessor;
            grants.process(&stored).unwrap();
        }

        b.iter(|| black_box(grants.active_for_partnership(partnership_id)).len());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_append_throughput,
    bench_router_dispatch,
    bench_projection_query
);
criterion_main!(benches);
