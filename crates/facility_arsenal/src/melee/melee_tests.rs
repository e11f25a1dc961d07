//! Charge blade FSM tests (SandboxWorld, tick by tick).

use std::sync::Arc;

use super::*;
use crate::host::{GameMode, ItemSnapshot, PropertyValue, WorldEvent};
use crate::test_rig::Rig;

const MOB_AT: Vec3 = Vec3::new(0.0, 0.0, 3.0);

fn wielding(tuning: BladeTuning, damage: u32) -> (Rig, ChargeBlade) {
    let mut rig = Rig::new();
    rig.give(
        0,
        ItemSnapshot::new(tuning.item_type_id.as_str()).with_durability(damage, 200),
    );
    let blade = ChargeBlade::new(&rig.binding(0), Arc::new(tuning));
    (rig, blade)
}

fn charge(rig: &mut Rig, blade: &mut ChargeBlade) {
    let threshold = blade.tuning().charge_threshold as usize;
    blade.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(blade, threshold);
    blade.on_stop_use(&mut rig.ctx()).unwrap();
}

fn blade_damage(rig: &Rig) -> u32 {
    rig.world
        .item(rig.player, 0)
        .and_then(|i| i.durability)
        .map_or(0, |d| d.damage)
}

fn melee_hits(rig: &Rig, target: HostEntity) -> usize {
    rig.world.count(|e| {
        matches!(e, WorldEvent::Damage { target: t, cause: DamageCause::Melee, .. } if *t == target)
    })
}

fn blowoffs_on(rig: &Rig, target: HostEntity) -> usize {
    rig.world
        .count(|e| matches!(e, WorldEvent::Knockback { entity, .. } if *entity == target))
}

#[test]
fn test_release_before_threshold_is_free() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    blade.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 5);
    assert_eq!(blade.state(), &BladeState::Charging { elapsed: 5 });

    blade.on_stop_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 3);

    assert!(blade.state().is_idle());
    assert_eq!(blade.ledger().pending(), 0);
    assert_eq!(blade_damage(&rig), 0);
    assert_eq!(melee_hits(&rig, mob), 0);
}

#[test]
fn test_charged_slash_hits_once_and_settles() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    charge(&mut rig, &mut blade);
    assert_eq!(rig.world.sounds("arsenal.katana.ready"), 1);
    assert!(matches!(blade.state(), BladeState::Slashing { elapsed: 0, .. }));

    // dash_tick 2 + damage_window 3 + redo_window 6 = 11 тиков до Idle
    rig.ticks(&mut blade, 11);
    assert!(blade.state().is_idle());
    assert_eq!(melee_hits(&rig, mob), 1);
    assert_eq!(rig.world.health(mob), Some(90.0));
    assert_eq!(blade.ledger().pending(), 2);

    // Idle тик → settle
    rig.ticks(&mut blade, 1);
    assert_eq!(blade.ledger().pending(), 0);
    assert_eq!(blade_damage(&rig), 2);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:katana"), 8);
}

#[test]
fn test_lockon_pins_until_release_then_blows_off_once() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    charge(&mut rig, &mut blade);
    // Повторное нажатие до dash tick = lock trigger
    blade.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 3);

    let lock = blade.state().lockon().cloned().unwrap();
    assert_eq!(lock.captured, vec![mob]);
    let pinned = Vec3::new(0.0, 0.0, 1.5);
    assert!(lock.player_lock_loc.distance(pinned) < 1e-4);

    for _ in 0..5 {
        rig.world.set_location(mob, Vec3::new(4.0, 0.0, 6.0));
        rig.world.set_location(rig.player, Vec3::new(-3.0, 0.0, 0.0));
        rig.tick(&mut blade).unwrap();
        assert!(rig.world.location(rig.player).unwrap().distance(pinned) < 1e-4);
        assert_eq!(rig.world.location(mob), Some(MOB_AT));
    }
    assert_eq!(blowoffs_on(&rig, mob), 0);
    assert_eq!(rig.world.health(mob), Some(97.5));

    blade.on_stop_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 4);

    assert!(blade.state().is_idle());
    assert_eq!(blade.blowoffs(), 1);
    assert_eq!(blowoffs_on(&rig, mob), 1);
    // slash 2 + 5 lock ticks
    assert_eq!(blade_damage(&rig), 7);
}

#[test]
fn test_failed_lockon_tick_still_releases_targets() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    charge(&mut rig, &mut blade);
    blade.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 3);
    assert!(blade.state().lockon().is_some());

    // Игрок пропал посреди lock-on: тик падает, но цель отпускается
    rig.world.disconnect(rig.player);
    assert!(rig.tick(&mut blade).is_err());

    assert!(blade.state().is_idle());
    assert_eq!(blade.blowoffs(), 1);
    assert_eq!(blowoffs_on(&rig, mob), 1);

    blade.on_remove(&mut rig.ctx()).unwrap();
    assert_eq!(blade.blowoffs(), 1);
    assert_eq!(blowoffs_on(&rig, mob), 1);
}

#[test]
fn test_ignore_capture_ends_lockon() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    charge(&mut rig, &mut blade);
    blade.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 4);
    assert!(blade.state().lockon().is_some());

    rig.world.mark(mob, IGNORE_CAPTURE_KEY, PropertyValue::Bool(true));
    rig.ticks(&mut blade, 1);

    assert!(blade.state().is_idle());
    assert_eq!(blade.blowoffs(), 1);
    // Помеченная цель выпала из набора до blow-off
    assert_eq!(blowoffs_on(&rig, mob), 0);
}

#[test]
fn test_ignore_marked_target_never_captured() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);
    rig.world.mark(mob, IGNORE_CAPTURE_KEY, PropertyValue::Bool(true));

    charge(&mut rig, &mut blade);
    blade.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 3);

    assert!(blade.state().lockon().is_none());
    assert!(matches!(blade.state(), BladeState::Slashing { .. }));
}

#[test]
fn test_sneak_lockon_follows_sneak() {
    let (mut rig, mut blade) = wielding(BladeTuning::breaker_greatsword(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 200.0);

    charge(&mut rig, &mut blade);
    rig.world.set_sneaking(rig.player, true);
    // dash_tick 4
    rig.ticks(&mut blade, 5);
    assert!(blade.state().lockon().is_some());
    assert_eq!(rig.world.count(|e| matches!(e, WorldEvent::Spawned { kind, .. } if kind == "arsenal:slash_wave")), 0);

    rig.ticks(&mut blade, 3);
    assert!(blade.state().lockon().is_some());

    rig.world.set_sneaking(rig.player, false);
    rig.ticks(&mut blade, 1);
    assert!(blade.state().is_idle());
    assert_eq!(blowoffs_on(&rig, mob), 1);
}

#[test]
fn test_greatsword_without_lock_fires_wave() {
    let (mut rig, mut blade) = wielding(BladeTuning::breaker_greatsword(), 0);

    charge(&mut rig, &mut blade);
    rig.ticks(&mut blade, 5);

    assert_eq!(
        rig.world
            .count(|e| matches!(e, WorldEvent::Spawned { kind, .. } if kind == "arsenal:slash_wave")),
        1
    );
}

fn plunge_from(height: f32) -> (Rig, ChargeBlade, HostEntity) {
    let (mut rig, mut blade) = wielding(BladeTuning::breaker_greatsword(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", Vec3::new(1.0, 0.0, 0.0), 100.0);
    rig.world.set_on_ground(rig.player, false);
    rig.world.set_location(rig.player, Vec3::new(0.0, height, 0.0));
    rig.world.set_rotation(rig.player, Vec2::new(60.0, 0.0));

    blade.on_start_use(&mut rig.ctx()).unwrap();
    assert_eq!(blade.state(), &BladeState::PlungeWindup { elapsed: 0 });
    rig.ticks(&mut blade, 4);
    assert!(matches!(blade.state(), BladeState::PlungeFall { .. }));

    rig.world.set_location(rig.player, Vec3::ZERO);
    rig.world.set_on_ground(rig.player, true);
    rig.ticks(&mut blade, 1);
    (rig, blade, mob)
}

#[test]
fn test_heavy_plunge() {
    let (mut rig, mut blade, mob) = plunge_from(8.0);

    assert!(matches!(blade.state(), BladeState::PlungeImpact { .. }));
    assert_eq!(rig.world.sounds("arsenal.greatsword.plunge_heavy"), 1);
    assert_eq!(rig.world.sounds("arsenal.greatsword.plunge"), 0);
    // base 8 + 8 блоков * 2
    assert_eq!(rig.world.health(mob), Some(100.0 - 24.0));

    rig.ticks(&mut blade, 9);
    assert!(blade.state().is_idle());
    assert_eq!(blade_damage(&rig), 4);
}

#[test]
fn test_plain_plunge() {
    let (rig, _blade, mob) = plunge_from(3.0);

    assert_eq!(rig.world.sounds("arsenal.greatsword.plunge"), 1);
    assert_eq!(rig.world.sounds("arsenal.greatsword.plunge_heavy"), 0);
    assert_eq!(rig.world.health(mob), Some(100.0 - 14.0));
}

#[test]
fn test_grounded_start_use_does_not_plunge() {
    let (mut rig, mut blade) = wielding(BladeTuning::breaker_greatsword(), 0);
    rig.world.set_rotation(rig.player, Vec2::new(80.0, 0.0));

    blade.on_start_use(&mut rig.ctx()).unwrap();
    assert_eq!(blade.state(), &BladeState::Charging { elapsed: 0 });
}

#[test]
fn test_creative_discards_ledger() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);
    rig.world.set_game_mode(rig.player, GameMode::Creative);

    charge(&mut rig, &mut blade);
    rig.ticks(&mut blade, 12);

    assert!(blade.state().is_idle());
    assert_eq!(blade.ledger().pending(), 0);
    assert_eq!(blade_damage(&rig), 0);
}

#[test]
fn test_exhausted_blade_is_not_usable() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 200);

    assert!(blade.is_exhausted());
    assert!(!blade.is_usable(&rig.ctx()));
    blade.on_start_use(&mut rig.ctx()).unwrap();
    assert!(blade.state().is_idle());
    assert_eq!(
        rig.world.count(|e| matches!(e, WorldEvent::Status { text, .. } if text == "Storm katana needs repair")),
        1
    );
}

#[test]
fn test_settle_exhausts_blade() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 199);
    rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    charge(&mut rig, &mut blade);
    rig.ticks(&mut blade, 12);

    assert_eq!(blade_damage(&rig), 200);
    assert!(blade.is_exhausted());
}

#[test]
fn test_redo_chains_second_slash() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    charge(&mut rig, &mut blade);
    rig.ticks(&mut blade, 6);

    // Тап после dash tick: redo, не lock-on
    blade.on_start_use(&mut rig.ctx()).unwrap();
    blade.on_stop_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 1);
    assert!(matches!(blade.state(), BladeState::Slashing { elapsed: 0, .. }));

    rig.ticks(&mut blade, 3);
    assert_eq!(melee_hits(&rig, mob), 2);
    assert_eq!(rig.world.health(mob), Some(80.0));
}

#[test]
fn test_swing_respects_attack_cooldown() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", Vec3::new(0.0, 0.0, 2.0), 100.0);

    blade.on_swing(&mut rig.ctx()).unwrap();
    blade.on_swing(&mut rig.ctx()).unwrap();
    assert_eq!(melee_hits(&rig, mob), 1);
    assert_eq!(blade.ledger().pending(), 1);

    rig.ticks(&mut blade, 8);
    blade.on_swing(&mut rig.ctx()).unwrap();
    assert_eq!(melee_hits(&rig, mob), 2);
}

#[test]
fn test_remove_during_lockon_releases_and_settles() {
    let (mut rig, mut blade) = wielding(BladeTuning::storm_katana(), 0);
    let mob = rig.world.spawn_mob("minecraft:zombie", MOB_AT, 100.0);

    charge(&mut rig, &mut blade);
    blade.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut blade, 5);
    assert!(blade.state().lockon().is_some());

    blade.on_remove(&mut rig.ctx()).unwrap();
    blade.on_remove(&mut rig.ctx()).unwrap();

    assert!(blade.state().is_idle());
    assert_eq!(blowoffs_on(&rig, mob), 1);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:katana"), 0);
    assert_eq!(blade.ledger().pending(), 0);
    // slash 2 + 2 lock ticks
    assert_eq!(blade_damage(&rig), 4);
}
