use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use route_sim::{resolve_step, Board};

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    for pieces in [10usize, 40, 80, 100] {
        let mut rng = ChaCha8Rng::seed_from_u64(pieces as u64);
        let mut board = Board::new();
        if board.random_pieces(pieces, &mut rng).is_ok() {
            board.random_routes(&mut rng);
        }
        group.bench_with_input(BenchmarkId::new("pieces", pieces), &board, |b, board| {
            b.iter(|| resolve_step(black_box(board), None));
        });
    }

    group.finish();
}

criterion_group!(step_benches, bench_step);
criterion_main!(step_benches);
