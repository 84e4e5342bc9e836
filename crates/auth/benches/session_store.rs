use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::TimeDelta;
use cmsgate_auth::{
    CsrfGuard, OsTokenSource, Permission, PermissionTable, Role, SessionStore, SystemClock,
    UserView,
};
use cmsgate_core::UserId;

fn store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(Arc::new(SystemClock), Arc::new(OsTokenSource)))
}

fn user(id: i64) -> UserView {
    UserView {
        id: UserId::new(id),
        username: format!("user{id}"),
        email: format!("user{id}@bpo.com"),
        role: Role::new("agent"),
    }
}

fn bench_session_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_lifecycle");

    group.bench_function("create_then_destroy", |b| {
        let sessions = store();
        b.iter(|| {
            let id = sessions.create(user(1)).unwrap();
            sessions.destroy(black_box(&id)).unwrap();
        });
    });

    group.bench_function("expiry_check_and_extend", |b| {
        let sessions = store();
        let id = sessions.create(user(1)).unwrap();
        let timeout = TimeDelta::seconds(3600);
        b.iter(|| {
            black_box(sessions.is_expired(&id, timeout));
            sessions.extend(&id).unwrap();
        });
    });

    group.finish();
}

fn bench_lookup_under_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_under_load");

    for live in [10_i64, 1_000, 100_000].iter() {
        let sessions = store();
        let ids: Vec<_> = (0..*live).map(|i| sessions.create(user(i)).unwrap()).collect();
        let target = ids[ids.len() / 2].clone();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(live), live, |b, _| {
            b.iter(|| black_box(sessions.is_authenticated(&target)));
        });
    }

    group.finish();
}

fn bench_csrf_and_permissions(c: &mut Criterion) {
    let mut group = c.benchmark_group("csrf_and_permissions");
    let sessions = store();
    let csrf = CsrfGuard::new(sessions.clone());
    let id = sessions.create_anonymous().unwrap();
    let token = csrf.issue_token(&id).unwrap();
    let table = PermissionTable::default();
    let agent = Role::new("agent");
    let perm = Permission::new("task.edit");

    group.bench_function("csrf_verify", |b| {
        b.iter(|| black_box(csrf.verify(&id, black_box(&token))));
    });

    group.bench_function("permission_grant_lookup", |b| {
        b.iter(|| black_box(table.grants(&agent, &perm)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_session_lifecycle,
    bench_lookup_under_load,
    bench_csrf_and_permissions
);
criterion_main!(benches);
