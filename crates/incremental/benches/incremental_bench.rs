//! Benchmarks for trellis-incremental.
//!
//! Target: one fact update through a join or group-by < 100μs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::cell::Cell;
use std::rc::Rc;
use trellis_incremental::collectors::{count, sum};
use trellis_incremental::{
    Dataset, FactRef, FactType, FactsExt, Joiners, KeyFn, Predicate, Session, StreamFactory,
    Value,
};

#[derive(Debug)]
struct Lesson {
    room: Cell<i64>,
    minutes: Cell<i64>,
}

#[derive(Debug)]
struct Room {
    id: i64,
}

fn lesson_room() -> KeyFn {
    KeyFn::new(|f| Ok(Value::Int64(f.fact::<Lesson>(0)?.room.get())))
}

fn make_lessons(size: usize, rooms: i64) -> Vec<(Rc<Lesson>, FactRef)> {
    (0..size)
        .map(|i| {
            let lesson = Rc::new(Lesson {
                room: Cell::new(i as i64 % rooms),
                minutes: Cell::new(45 + (i as i64 % 3) * 15),
            });
            let fact = FactRef::from_rc(lesson.clone());
            (lesson, fact)
        })
        .collect()
}

fn join_session(lessons: &[(Rc<Lesson>, FactRef)], rooms: i64) -> (Session, Dataset) {
    let factory = StreamFactory::new(vec![FactType::of::<Lesson>(), FactType::of::<Room>()]);
    let joined = factory
        .for_each::<Lesson>()
        .unwrap()
        .join(
            &factory.for_each::<Room>().unwrap(),
            Joiners::new().equal_by(
                lesson_room(),
                KeyFn::new(|f| Ok(Value::Int64(f.fact::<Room>(0)?.id))),
            ),
        )
        .unwrap()
        .dataset()
        .unwrap();
    let plan = factory.build(&[joined]).unwrap();
    let facts = lessons
        .iter()
        .map(|(_, fact)| fact.clone())
        .chain((0..rooms).map(|id| FactRef::new(Room { id })));
    (plan.build_session(facts).unwrap(), joined)
}

fn group_session(lessons: &[(Rc<Lesson>, FactRef)]) -> (Session, Dataset) {
    let factory = StreamFactory::new(vec![FactType::of::<Lesson>()]);
    let grouped = factory
        .for_each::<Lesson>()
        .unwrap()
        .filter(Predicate::new(|f| Ok(f.fact::<Lesson>(0)?.minutes.get() > 0)))
        .unwrap()
        .group_by(
            vec![lesson_room()],
            vec![
                count().into(),
                sum(|f| Ok(f.fact::<Lesson>(0)?.minutes.get())).into(),
            ],
        )
        .unwrap()
        .dataset()
        .unwrap();
    let plan = factory.build(&[grouped]).unwrap();
    let facts = lessons.iter().map(|(_, fact)| fact.clone());
    (plan.build_session(facts).unwrap(), grouped)
}

fn bench_build_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_session");

    for size in [100, 1000, 10000] {
        let lessons = make_lessons(size, 50);
        group.bench_with_input(BenchmarkId::new("join", size), &lessons, |b, lessons| {
            b.iter(|| join_session(black_box(lessons), 50))
        });
    }

    group.finish();
}

fn bench_join_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_churn");

    for size in [100, 1000, 10000] {
        let lessons = make_lessons(size, 50);
        let (mut session, joined) = join_session(&lessons, 50);
        let mut step = 0usize;

        group.bench_function(BenchmarkId::new("move_room", size), |b| {
            b.iter(|| {
                step += 1;
                let (lesson, fact) = &lessons[step % lessons.len()];
                lesson.room.set((lesson.room.get() + 1) % 50);
                session.update(fact).unwrap();
                session.trigger_listeners().unwrap();
                black_box(session.dataset(&joined).unwrap().len())
            })
        });

        group.bench_function(BenchmarkId::new("retract_insert", size), |b| {
            b.iter(|| {
                step += 1;
                let (_, fact) = &lessons[step % lessons.len()];
                session.retract(fact).unwrap();
                session.trigger_listeners().unwrap();
                session.insert(fact.clone()).unwrap();
                session.trigger_listeners().unwrap();
            })
        });
    }

    group.finish();
}

fn bench_group_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_churn");

    for size in [100, 1000, 10000] {
        let lessons = make_lessons(size, 50);
        let (mut session, grouped) = group_session(&lessons);
        let mut step = 0usize;

        group.bench_function(BenchmarkId::new("change_minutes", size), |b| {
            b.iter(|| {
                step += 1;
                let (lesson, fact) = &lessons[step % lessons.len()];
                lesson.minutes.set(30 + (step as i64 % 4) * 15);
                session.update(fact).unwrap();
                session.trigger_listeners().unwrap();
                black_box(session.dataset(&grouped).unwrap().len())
            })
        });

        group.bench_function(BenchmarkId::new("move_group", size), |b| {
            b.iter(|| {
                step += 1;
                let (lesson, fact) = &lessons[step % lessons.len()];
                lesson.room.set((lesson.room.get() + 7) % 50);
                session.update(fact).unwrap();
                session.trigger_listeners().unwrap();
            })
        });
    }

    group.finish();
}

fn bench_coalesced_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalesced_batch");

    for batch in [10, 100, 1000] {
        let lessons = make_lessons(10000, 50);
        let (mut session, _) = join_session(&lessons, 50);

        group.bench_with_input(BenchmarkId::new("updates", batch), &batch, |b, &batch| {
            b.iter(|| {
                for (lesson, fact) in lessons.iter().take(batch) {
                    lesson.room.set((lesson.room.get() + 1) % 50);
                    session.update(fact).unwrap();
                    session.update(fact).unwrap();
                }
                session.trigger_listeners().unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build_session,
    bench_join_churn,
    bench_group_churn,
    bench_coalesced_batch,
);

criterion_main!(benches);
