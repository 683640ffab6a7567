//! Scalability benchmarks for the arena room core
//!
//! Measures visibility and routing cost at increasing player counts.
//!
//! Run with: cargo bench --bench scalability

use std::sync::Arc;
use std::time::{Duration, Instant};

use arena_room_core::config::ServerConfig;
use arena_room_core::game::spatial::SpatialIndex;
use arena_room_core::game::state::{Mob, MobType, World};
use arena_room_core::game::ticker::TickInfo;
use arena_room_core::metrics::Metrics;
use arena_room_core::net::broadcast::{BroadcastRouter, Payload, RecordingOutbound};
use arena_room_core::net::game_session::{GameAction, GameSession, SessionEvent, Simulation};
use arena_room_core::net::outbox;
use arena_room_core::net::protocol::MutationEvent;
use arena_room_core::net::viewport::ViewportManager;
use arena_room_core::util::vec2::Vec2;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

const ARENA_HALF: f32 = 16_384.0;

fn random_position(rng: &mut impl Rng) -> Vec2 {
    Vec2::new(
        rng.gen_range(-ARENA_HALF..ARENA_HALF),
        rng.gen_range(-ARENA_HALF..ARENA_HALF),
    )
}

/// World with `players` player mobs and four missiles per player
fn create_world(players: u32) -> World {
    let mut rng = rand::thread_rng();
    let mut world = World::new();
    for id in 0..players {
        world.spawn(Mob::new(id, MobType::Player, random_position(&mut rng)));
    }
    for id in players..players * 5 {
        world.spawn(Mob::new(id, MobType::Missile, random_position(&mut rng)));
    }
    world
}

fn create_viewports(world: &World, players: u32) -> ViewportManager {
    let mut viewports = ViewportManager::default();
    for id in 0..players {
        if let Some(mob) = world.get(id) {
            let _ = viewports.create_viewport(id, id as u64, mob.position);
        }
    }
    viewports
}

/// Benchmark spatial index rebuild
fn bench_spatial_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_index");
    group.sample_size(50);

    for count in [100, 250, 500, 1000] {
        let world = create_world(count);
        let mut index = SpatialIndex::default();

        group.throughput(Throughput::Elements(world.len() as u64));
        group.bench_with_input(BenchmarkId::new("rebuild", count), &count, |b, _| {
            b.iter(|| {
                index.rebuild(world.iter());
                black_box(index.len())
            })
        });
    }
    group.finish();
}

/// Benchmark recomputing every viewport and applying the deltas to the router
fn bench_viewport_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("viewport_recompute");
    group.sample_size(30);

    for count in [100, 250, 500, 1000] {
        let mut world = create_world(count);
        let mut index = SpatialIndex::default();
        let mut viewports = create_viewports(&world, count);
        let mut router = BroadcastRouter::new();
        let mut rng = rand::thread_rng();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("all_viewports", count), &count, |b, _| {
            b.iter(|| {
                // Nudge every mob so membership actually changes
                let ids: Vec<u32> = world.iter().map(|m| m.id).collect();
                for id in ids {
                    let step = Vec2::new(rng.gen_range(-64.0..64.0), rng.gen_range(-64.0..64.0));
                    if let Some(position) = world.get(id).map(|m| m.position + step) {
                        world.set_position(id, position);
                    }
                }
                index.rebuild(world.iter());
                for id in viewports.ids() {
                    if let Ok(delta) = viewports.recompute(id, &index) {
                        black_box(router.apply_viewport_delta(&viewports, id, &delta).ok());
                    }
                }
            })
        });
    }
    group.finish();
}

/// Benchmark routing one update per mob to its observers
fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    group.sample_size(50);

    for count in [100, 250, 500, 1000] {
        let world = create_world(count);
        let mut index = SpatialIndex::default();
        index.rebuild(world.iter());
        let mut viewports = create_viewports(&world, count);
        let mut router = BroadcastRouter::new();
        for id in viewports.ids() {
            if let Ok(delta) = viewports.recompute(id, &index) {
                let _ = router.apply_viewport_delta(&viewports, id, &delta);
            }
        }
        let payload: Payload = Arc::from(vec![0u8; 48]);
        let mob_ids: Vec<u32> = world.iter().map(|m| m.id).collect();

        group.throughput(Throughput::Elements(mob_ids.len() as u64));
        group.bench_with_input(BenchmarkId::new("every_mob", count), &count, |b, _| {
            b.iter(|| {
                let mut outbound = RecordingOutbound::default();
                for &id in &mob_ids {
                    router.route(id, &payload, &mut outbound);
                }
                black_box(outbound.sent.len())
            })
        });
    }
    group.finish();
}

/// Moves every mob a little and reports each as mutated
struct Drift {
    frame_mutations: Vec<u32>,
}

impl Simulation for Drift {
    fn step(&mut self, _: &TickInfo, _: &[GameAction], world: &mut World, mutations: &mut Vec<MutationEvent>) {
        let mut rng = rand::thread_rng();
        for &id in &self.frame_mutations {
            let step = Vec2::new(rng.gen_range(-16.0..16.0), rng.gen_range(-16.0..16.0));
            if let Some(position) = world.get(id).map(|m| m.position + step) {
                world.set_position(id, position);
                mutations.push(MutationEvent::new(id, "mob", "{}", "{}", 0));
            }
        }
    }
}

/// Benchmark a full session tick (events, recompute, routing, sync)
fn bench_session_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_tick");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    for count in [100, 250, 500] {
        let config = ServerConfig::default();
        let mut now = Instant::now();
        let (mut session, tx) = GameSession::new(&config, Arc::new(Metrics::new()), now);
        let mut rng = rand::thread_rng();
        let mut receivers = Vec::new();
        for id in 0..count {
            let (sender, rx) = outbox::channel();
            receivers.push(rx);
            let _ = tx.send(SessionEvent::PlayerConnected {
                connection_id: id as u64,
                player_id: id,
                horizon: random_position(&mut rng),
                sender,
            });
        }
        let mut simulation = Drift {
            frame_mutations: (0..count).collect(),
        };

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("complete", count), &count, |b, _| {
            b.iter(|| {
                now += Duration::from_millis(16);
                black_box(session.tick(now, &mut simulation));
                for rx in receivers.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_spatial_rebuild,
    bench_viewport_recompute,
    bench_routing,
    bench_session_tick,
);

criterion_main!(benches);
