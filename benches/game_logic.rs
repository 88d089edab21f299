use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netris::core::{generate, Bag, Generator, Matrix};
use netris::net::protocol::{encode, decode, Command, UpdateMatrixPayload};
use netris::types::{Block, Direction, GameAction};

fn tetromino_matrix(seed: u64) -> Matrix {
    let minos = Generator::new().generate(4).unwrap();
    let mut matrix = Matrix::with_bag(10, 20, 20, Bag::new(seed, minos));
    matrix.start();
    matrix
}

fn bench_generate(c: &mut Criterion) {
    c.bench_function("generate_rank_6", |b| {
        b.iter(|| generate(black_box(6)).unwrap())
    });
}

fn bench_line_clear(c: &mut Criterion) {
    c.bench_function("clear_4_lines", |b| {
        b.iter(|| {
            let mut matrix = Matrix::new(10, 20, 4);
            for y in 0..4 {
                for x in 0..10 {
                    matrix.set_block(x, y, Block::Garbage);
                }
            }
            matrix.clear_filled()
        })
    });
}

fn bench_move(c: &mut Criterion) {
    let mut matrix = tetromino_matrix(12345);
    let mut dx = 1;

    c.bench_function("move_piece", |b| {
        b.iter(|| {
            if !matrix.move_piece(dx, 0) {
                dx = -dx;
            }
        })
    });
}

fn bench_rotate(c: &mut Criterion) {
    let mut matrix = tetromino_matrix(12345);

    c.bench_function("rotate_piece", |b| {
        b.iter(|| matrix.rotate_piece(black_box(1), Direction::Cw))
    });
}

fn bench_hard_drop(c: &mut Criterion) {
    c.bench_function("hard_drop_until_top_out", |b| {
        b.iter(|| {
            let mut matrix = tetromino_matrix(7);
            while !matrix.is_game_over() {
                matrix.apply_action(GameAction::HardDrop);
            }
            matrix.score()
        })
    });
}

fn bench_update_matrix_codec(c: &mut Criterion) {
    let mut matrix = tetromino_matrix(99);
    for _ in 0..10 {
        matrix.apply_action(GameAction::HardDrop);
    }
    let command = Command::UpdateMatrix(UpdateMatrixPayload {
        player: 1,
        matrix: (&matrix.snapshot()).into(),
    });

    c.bench_function("update_matrix_codec", |b| {
        b.iter(|| decode(&encode(black_box(&command)).unwrap()).unwrap())
    });
}

criterion_group!(
    benches,
    bench_generate,
    bench_line_clear,
    bench_move,
    bench_rotate,
    bench_hard_drop,
    bench_update_matrix_codec
);
criterion_main!(benches);
