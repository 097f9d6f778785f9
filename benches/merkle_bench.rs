use criterion::{black_box, criterion_group, criterion_main, Criterion};
use veilmint_primitives::{token_leaf, verify_inclusion, MerkleTree};

fn bench_tree_build(c: &mut Criterion) {
    let ids: Vec<u64> = (1..=1_000).collect();

    c.bench_function("tree_build_1000", |b| {
        b.iter(|| {
            let tree = MerkleTree::build(black_box(&ids)).expect("non-empty");
            black_box(tree.root());
        });
    });
}

fn bench_proof_extract(c: &mut Criterion) {
    let ids: Vec<u64> = (1..=1_000).collect();
    let tree = MerkleTree::build(&ids).expect("non-empty");

    c.bench_function("proof_extract", |b| {
        b.iter(|| {
            let _ = tree.proof(black_box(512));
        });
    });
}

fn bench_proof_verify(c: &mut Criterion) {
    let ids: Vec<u64> = (1..=1_000).collect();
    let tree = MerkleTree::build(&ids).expect("non-empty");
    let root = tree.root();
    let leaf = token_leaf(512);
    let proof = tree.proof(512).expect("member");

    c.bench_function("proof_verify", |b| {
        b.iter(|| {
            let _ = verify_inclusion(black_box(&root), black_box(&leaf), black_box(&proof));
        });
    });
}

criterion_group!(
    benches,
    bench_tree_build,
    bench_proof_extract,
    bench_proof_verify
);
criterion_main!(benches);
