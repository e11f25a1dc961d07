//! Headless симуляция арсенала
//!
//! Запускает Bevy App без рендера поверх `SandboxWorld`: игрок стреляет из
//! карабина, перезаряжается, берёт катану и делает lock-on на манекене.
//!
//! Usage: `facility_arsenal [config.ron]`

use bevy::prelude::*;
use facility_arsenal::host::{ItemHost, ItemSnapshot, SandboxWorld};
use facility_arsenal::{
    create_sandbox_app, logger, step_sandbox, ArsenalConfig, HostWorld, ItemInput, ItemInputKind,
    SessionManager,
};

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match ArsenalConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Failed to load {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => ArsenalConfig::default(),
    };
    println!("Starting arsenal headless simulation (seed: {})", config.rng_seed);

    let mut world = SandboxWorld::new();
    let player = world.spawn_player(Vec3::ZERO);
    world.give(player, 0, ItemSnapshot::new("arsenal:carbine"));
    world.give(player, 1, ItemSnapshot::new("arsenal:storm_katana").with_durability(0, 500));
    world.give(
        player,
        9,
        ItemSnapshot::new("arsenal:carbine_magazine").with_durability(0, 20),
    );
    world.give(player, 10, ItemSnapshot::stack("arsenal:rifle_round", 64));
    let dummy = world.spawn_mob("arsenal:training_dummy", Vec3::new(0.0, 0.0, 12.0), 500.0);
    world.spawn_mob("arsenal:training_dummy", Vec3::new(0.0, 0.0, 3.0), 200.0);

    let mut app = create_sandbox_app(config, world);
    logger::log_info(&format!("📜 Log level: {}", logger::log_level()));
    let send = |app: &mut App, kind: ItemInputKind| {
        app.world_mut().send_event(ItemInput::new(player, kind));
    };

    for tick in 0..300u32 {
        match tick {
            // Карабин: pickup, затем очередь до пустого магазина
            10 => send(&mut app, ItemInputKind::StartUse),
            60 => send(&mut app, ItemInputKind::StopUse),
            // Повторный start-use на пустом магазине → reload
            62 => send(&mut app, ItemInputKind::StartUse),
            63 => send(&mut app, ItemInputKind::StopUse),
            // Катана: charge → slash, повторное нажатие → lock-on
            120 => {
                let mut host = app.world_mut().resource_mut::<HostWorld<SandboxWorld>>();
                host.0.select_slot(player, 1);
            }
            130 => send(&mut app, ItemInputKind::StartUse),
            145 => send(&mut app, ItemInputKind::StopUse),
            146 => send(&mut app, ItemInputKind::StartUse),
            170 => send(&mut app, ItemInputKind::StopUse),
            _ => {}
        }

        step_sandbox(&mut app);

        if tick % 50 == 0 {
            let host = &app.world().resource::<HostWorld<SandboxWorld>>().0;
            let sessions = app.world().resource::<SessionManager>();
            logger::log_info(&format!(
                "Tick {}: {} session(s), dummy health {:?}, journal {} events",
                host.current_tick(),
                sessions.len(),
                host.health(dummy),
                host.journal().len()
            ));
        }
    }

    let sessions = app.world().resource::<SessionManager>();
    println!(
        "Simulation complete! {} instance(s) created, {} teardown(s)",
        sessions.created(),
        sessions.teardowns()
    );
}
