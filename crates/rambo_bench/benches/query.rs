use criterion::{criterion_group, criterion_main, Criterion, black_box};
use rambo_core::{take_intersection, Rambo, RamboConfig, SeqQuery};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn kmer(rng: &mut StdRng, len: usize) -> String {
    const GENE: &[u8; 4] = b"ATGC";
    (0..len).map(|_| GENE[rng.random_range(0..4usize)] as char).collect()
}

fn bench_query(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let cfg = RamboConfig { sets: 200, repeats: 3, bins: 20, capacity: 20_000, fpr: 0.01, ..RamboConfig::default() };
    let mut r = Rambo::new(&cfg).unwrap();
    r.create_meta_rambo(&[]).unwrap();
    for s in 0..200u32 {
        let keys: Vec<String> = (0..500).map(|_| kmer(&mut rng, 31)).collect();
        r.insertion(&s.to_string(), &keys).unwrap();
    }
    let probes: Vec<String> = (0..256).map(|_| kmer(&mut rng, 31)).collect();
    let seq = kmer(&mut rng, 1000);

    c.bench_function("query", |bch| {
        let mut i = 0;
        bch.iter(|| {
            i = (i + 1) % probes.len();
            black_box(r.query(probes[i].as_bytes()).unwrap())
        })
    });
    c.bench_function("query_seq_1kb", |bch| {
        bch.iter(|| black_box(r.query_seq(seq.as_bytes(), &SeqQuery::default()).unwrap()))
    });

    let a: Vec<u32> = (0..100_000).step_by(2).collect();
    let b: Vec<u32> = (0..100_000).step_by(3).collect();
    let d: Vec<u32> = (0..100_000).step_by(5).collect();
    c.bench_function("intersect", |bch| bch.iter(|| black_box(take_intersection(&[&a, &b, &d]))));
}

criterion_group!(benches, bench_query);
criterion_main!(benches);
