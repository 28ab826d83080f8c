use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};

use authgate_auth::{
    AuthorizationResolver, IdentityClaims, ResolverConfig, StateWriter, SubjectId, TokenError,
    TokenVerifier,
};
use authgate_infra::state_store::InMemoryStateStore;

/// Skips signature work so only store reconciliation is measured.
struct FixedVerifier(IdentityClaims);

impl TokenVerifier for FixedVerifier {
    fn verify(&self, _token: &str) -> Result<IdentityClaims, TokenError> {
        Ok(self.0.clone())
    }
}

fn claims() -> IdentityClaims {
    let issued_at = Utc::now() - ChronoDuration::seconds(30);
    IdentityClaims {
        subject_id: SubjectId::new("bench-user"),
        username: "bench".to_string(),
        email: "bench@example.com".to_string(),
        roles: BTreeSet::new(),
        token_permissions: vec!["cdn:zones:read".to_string(), "dns:*:*".to_string()],
        token_id: None,
        token_type: None,
        issuer: "auth-service".to_string(),
        issued_at,
        expires_at: issued_at + ChronoDuration::hours(1),
    }
}

fn resolver(store: Arc<InMemoryStateStore>, concurrent_reads: bool) -> AuthorizationResolver {
    AuthorizationResolver::new(
        Arc::new(FixedVerifier(claims())),
        store,
        ResolverConfig {
            concurrent_reads,
            ..ResolverConfig::default()
        },
    )
}

fn bench_resolution(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolution_latency");

    let empty = Arc::new(InMemoryStateStore::new());

    let populated = Arc::new(InMemoryStateStore::new());
    let subject = SubjectId::new("bench-user");
    rt.block_on(populated.set_account_status(&subject, true)).unwrap();
    populated.seed_dynamic_permissions(&subject, ["cdn:*:*", "billing:invoices:read"]);

    let down = Arc::new(InMemoryStateStore::new());
    down.set_unavailable(true);

    for (name, store) in [("empty_store", &empty), ("populated_store", &populated), ("store_down", &down)] {
        for concurrent in [true, false] {
            let resolver = resolver(store.clone(), concurrent);
            let mode = if concurrent { "concurrent" } else { "sequential" };
            group.bench_function(format!("{name}/{mode}"), |b| {
                b.iter(|| rt.block_on(resolver.resolve("token")).unwrap())
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
