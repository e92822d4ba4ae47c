// Transaction-id, proposal signing and batch validation benchmarks.
//
// Covers tx-id derivation, building and signing a proposal, and
// validating endorsement batches of various sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hfc_core::crypto::{Nonce, SigningKeypair};
use hfc_core::identity::{derive_transaction_id, IdentityContext, SigningIdentity};
use hfc_core::transaction::{
    responses_agree, validate, EndorsementResponse, ProposalBuilder, ProposalKind,
    ProposalResponse,
};
use hfc_core::transport::PeerRef;

fn admin() -> SigningIdentity {
    SigningIdentity::from_keypair("admin", "Org1MSP", SigningKeypair::from_seed(&[7u8; 32]))
}

fn bench_derive_tx_id(c: &mut Criterion) {
    let identity = admin();
    let nonce = Nonce::generate();

    c.bench_function("txid/derive", |b| {
        b.iter(|| derive_transaction_id(&nonce, &identity).unwrap());
    });
}

fn bench_build_and_sign_proposal(c: &mut Criterion) {
    let ctx = IdentityContext::new(admin()).unwrap();
    let targets = vec![
        PeerRef::new("peer1", "grpcs://localhost:7051"),
        PeerRef::new("peer2", "grpcs://localhost:8051"),
    ];

    c.bench_function("proposal/build_and_sign", |b| {
        b.iter(|| {
            ProposalBuilder::new(ProposalKind::Invoke)
                .channel("mychannel")
                .chaincode("end2end")
                .targets(targets.clone())
                .function("move")
                .args(["a", "b", "100"])
                .build(&ctx)
                .unwrap()
                .sign(&ctx)
                .unwrap()
        });
    });
}

fn bench_validate_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("endorsement/validate");

    for size in [2, 8, 32, 128] {
        let responses: Vec<_> = (0..size)
            .map(|i| {
                ProposalResponse::Endorsed(EndorsementResponse {
                    peer: format!("peer{i}"),
                    status: 200,
                    message: String::new(),
                    payload: vec![0xab; 256],
                    endorsement: None,
                    chaincode_event: None,
                })
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &responses, |b, r| {
            b.iter(|| validate(r) && responses_agree(r));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_derive_tx_id,
    bench_build_and_sign_proposal,
    bench_validate_batch,
);
criterion_main!(benches);
