//! Firearm FSM tests (driven tick by tick against SandboxWorld).

use std::sync::Arc;

use super::*;
use crate::ammo::count_ammo;
use crate::host::{FormResponse, PropertyValue, WorldEvent};
use crate::item::Wielded;
use crate::test_rig::Rig;

const MAG_SLOT: usize = 9;
const AMMO_SLOT: usize = 10;

fn armed(tuning: FirearmTuning, spare: u32) -> (Rig, Firearm) {
    let mut rig = Rig::new();
    rig.give(0, ItemSnapshot::new(tuning.item_type_id.as_str()));
    rig.give(
        MAG_SLOT,
        ItemSnapshot::new(tuning.magazine_type.as_str()).with_durability(0, tuning.magazine_capacity),
    );
    if spare > 0 {
        rig.give(AMMO_SLOT, ItemSnapshot::stack(tuning.ammo_type.as_str(), spare));
    }
    let pickup = tuning.pickup_ticks as usize;
    let mut gun = Firearm::new(&rig.binding(0), Arc::new(tuning), 0);
    rig.ticks(&mut gun, pickup);
    assert_eq!(gun.state(), FirearmState::Idle);
    (rig, gun)
}

fn expended(rig: &Rig) -> u32 {
    rig.world
        .item(rig.player, MAG_SLOT)
        .and_then(|m| m.durability)
        .map_or(0, |d| d.damage)
}

#[test]
fn test_pickup_blocks_use() {
    let mut rig = Rig::new();
    rig.give(0, ItemSnapshot::new("arsenal:carbine"));
    let gun = Firearm::new(&rig.binding(0), Arc::new(FirearmTuning::carbine()), 0);

    assert!(matches!(gun.state(), FirearmState::Pickup { ticks_left: 8 }));
    assert!(!gun.is_usable(&rig.ctx()));
}

#[test]
fn test_twenty_shots_then_single_reload_attempt() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 60);

    gun.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 60);

    assert_eq!(gun.shots_fired(), 20);
    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(gun.magazine().unwrap().remaining(), 0);
    assert_eq!(expended(&rig), 20);
    assert_eq!(gun.reload_attempts(), 0);
    assert_eq!(
        rig.world.count(|e| matches!(e, WorldEvent::Spawned { kind, .. } if kind == "arsenal:bullet")),
        20
    );

    // 21-й start-use: ровно одна попытка перезарядки, без выстрела
    gun.on_stop_use(&mut rig.ctx()).unwrap();
    gun.on_start_use(&mut rig.ctx()).unwrap();
    assert_eq!(gun.reload_attempts(), 1);
    assert_eq!(gun.shots_fired(), 20);
    assert!(matches!(gun.state(), FirearmState::Reload { tactical: false, .. }));

    rig.ticks(&mut gun, 40);
    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(gun.magazine().unwrap().remaining(), 20);
    assert_eq!(expended(&rig), 0);
    assert_eq!(count_ammo(&rig.world, rig.player, "arsenal:rifle_round"), 40);
    assert_eq!(rig.world.sounds("arsenal.carbine.mag_in"), 1);
    assert_eq!(gun.reload_attempts(), 1);
}

#[test]
fn test_partial_magazine_swing_is_tactical() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 60);

    gun.on_start_use(&mut rig.ctx()).unwrap();
    gun.on_stop_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 2);
    assert_eq!(gun.shots_fired(), 1);
    assert_eq!(gun.state(), FirearmState::Idle);

    gun.on_swing(&mut rig.ctx()).unwrap();
    assert!(matches!(gun.state(), FirearmState::Reload { tactical: true, .. }));

    let tactical = FirearmTuning::carbine().tactical_reload.duration as usize;
    rig.ticks(&mut gun, tactical);
    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(gun.magazine().unwrap().remaining(), 20);
    assert_eq!(count_ammo(&rig.world, rig.player, "arsenal:rifle_round"), 59);
}

#[test]
fn test_full_magazine_swing_does_nothing() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 60);
    gun.on_swing(&mut rig.ctx()).unwrap();
    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(gun.reload_attempts(), 0);
}

#[test]
fn test_reload_aborts_when_magazine_pulled() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 60);
    gun.on_start_use(&mut rig.ctx()).unwrap();
    gun.on_stop_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 2);
    gun.on_swing(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 5);

    rig.world.take(rig.player, MAG_SLOT);
    rig.tick(&mut gun).unwrap();

    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:carbine_a"), 0);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:carbine_b"), 0);
    assert_eq!(count_ammo(&rig.world, rig.player, "arsenal:rifle_round"), 60);

    // Магазина нет - следующий start-use только щёлкает
    rig.tick(&mut gun).unwrap();
    assert!(gun.magazine().is_none());
    gun.on_start_use(&mut rig.ctx()).unwrap();
    assert_eq!(gun.shots_fired(), 1);
    assert!(rig
        .world
        .journal()
        .iter()
        .any(|e| matches!(e, WorldEvent::Status { text, .. } if text == "Carbine: no magazine")));
}

#[test]
fn test_reload_aborts_when_ammo_runs_out() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 10);
    rig.give(
        MAG_SLOT,
        ItemSnapshot::new("arsenal:carbine_magazine").with_durability(20, 20),
    );

    // Пустой магазин + start-use → полная перезарядка
    gun.on_start_use(&mut rig.ctx()).unwrap();
    gun.on_stop_use(&mut rig.ctx()).unwrap();
    assert_eq!(gun.state(), FirearmState::Reload { tick: 0, tactical: false });
    rig.ticks(&mut gun, 5);
    assert!(rig.world.cooldown(rig.player, "arsenal:carbine_a") > 0);

    // Патроны ушли из инвентаря до load tick
    rig.world.take(rig.player, AMMO_SLOT);
    rig.tick(&mut gun).unwrap();

    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:carbine_a"), 0);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:carbine_b"), 0);
    assert_eq!(expended(&rig), 20);
    assert_eq!(rig.world.sounds("arsenal.carbine.mag_in"), 0);
    assert_eq!(count_ammo(&rig.world, rig.player, "arsenal:rifle_round"), 0);
}

#[test]
fn test_magazine_of_wrong_capacity_is_ignored() {
    let mut rig = Rig::new();
    rig.give(0, ItemSnapshot::new("arsenal:carbine"));
    rig.give(
        MAG_SLOT,
        ItemSnapshot::new("arsenal:carbine_magazine").with_durability(0, 30),
    );
    let mut gun = Firearm::new(&rig.binding(0), Arc::new(FirearmTuning::carbine()), 0);
    rig.ticks(&mut gun, 8);

    gun.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 5);

    assert!(gun.magazine().is_none());
    assert_eq!(gun.shots_fired(), 0);
    assert_eq!(gun.state(), FirearmState::Idle);
    assert!(rig
        .world
        .journal()
        .iter()
        .any(|e| matches!(e, WorldEvent::Status { text, .. } if text == "Carbine: no magazine")));
}

#[test]
fn test_empty_without_spare_clicks() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 0);
    rig.give(
        MAG_SLOT,
        ItemSnapshot::new("arsenal:carbine_magazine").with_durability(20, 20),
    );

    gun.on_start_use(&mut rig.ctx()).unwrap();
    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(gun.reload_attempts(), 0);
    assert_eq!(rig.world.sounds("arsenal.generic.dry_fire"), 1);
}

#[test]
fn test_cooldown_channels_ping_pong() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 0);
    gun.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 4);
    assert_eq!(gun.shots_fired(), 3);

    let armed_channels: Vec<String> = rig
        .world
        .journal()
        .iter()
        .filter_map(|e| match e {
            WorldEvent::Cooldown { category, ticks, .. } if *ticks > 0 => Some(category.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        armed_channels,
        vec!["arsenal:carbine_a", "arsenal:carbine_b", "arsenal:carbine_a"]
    );
}

#[test]
fn test_bolt_action_cycles_between_shots() {
    let (mut rig, mut gun) = armed(FirearmTuning::marksman_rifle(), 10);

    gun.on_start_use(&mut rig.ctx()).unwrap();
    gun.on_stop_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 3);
    assert_eq!(gun.state(), FirearmState::BoltCycle { tick: 0 });

    // Во время цикла затвора start-use игнорируется
    gun.on_start_use(&mut rig.ctx()).unwrap();
    gun.on_stop_use(&mut rig.ctx()).unwrap();
    assert_eq!(gun.shots_fired(), 1);

    rig.ticks(&mut gun, 14);
    assert_eq!(gun.state(), FirearmState::Idle);
    assert_eq!(rig.world.sounds("arsenal.marksman.bolt_close"), 1);

    // Последний патрон - без цикла затвора
    rig.give(
        MAG_SLOT,
        ItemSnapshot::new("arsenal:marksman_magazine").with_durability(4, 5),
    );
    rig.tick(&mut gun).unwrap();
    gun.on_start_use(&mut rig.ctx()).unwrap();
    gun.on_stop_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 3);
    assert_eq!(gun.shots_fired(), 2);
    assert_eq!(gun.state(), FirearmState::Idle);
}

#[test]
fn test_semi_auto_beam_fires_once_per_press() {
    let (mut rig, mut gun) = armed(FirearmTuning::pulse_pistol(), 0);

    gun.on_start_use(&mut rig.ctx()).unwrap();
    rig.ticks(&mut gun, 12);

    assert_eq!(gun.shots_fired(), 1);
    assert_eq!(rig.dispatch.in_flight(), 1);
    assert_eq!(rig.world.sounds("arsenal.pulse.fire"), 1);
}

#[test]
fn test_suppressor_changes_fire_sound() {
    let tuning = FirearmTuning::carbine();
    let mut rig = Rig::new();
    rig.give(
        0,
        ItemSnapshot::new("arsenal:carbine").with_property(MUZZLE_KEY, PropertyValue::Text("suppressor".into())),
    );
    rig.give(MAG_SLOT, ItemSnapshot::new("arsenal:carbine_magazine").with_durability(0, 20));
    let mut gun = Firearm::new(&rig.binding(0), Arc::new(tuning), 0);
    assert_eq!(gun.attachments().muzzle.as_deref(), Some("suppressor"));

    rig.ticks(&mut gun, 8);
    gun.on_start_use(&mut rig.ctx()).unwrap();
    assert_eq!(rig.world.sounds("arsenal.carbine.fire_suppressed"), 1);
    assert_eq!(rig.world.sounds("arsenal.carbine.fire"), 0);
}

#[test]
fn test_sneak_swing_opens_bench_and_edit_invalidates_key() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 0);
    rig.world.set_sneaking(rig.player, true);

    gun.on_swing(&mut rig.ctx()).unwrap();
    let tickets = rig.world.open_forms(rig.player);
    assert_eq!(tickets.len(), 1);
    assert_eq!(gun.reload_attempts(), 0);

    // Повторный жест не открывает вторую форму
    gun.on_swing(&mut rig.ctx()).unwrap();
    assert_eq!(rig.world.open_forms(rig.player).len(), 1);

    let buttons = rig.world.form_request(tickets[0]).unwrap().buttons.clone();
    let holo = buttons.iter().position(|b| b == "Sight: Holographic").unwrap();
    rig.world.answer_form(tickets[0], FormResponse::Button(holo));
    assert_eq!(rig.forms.poll(&mut rig.world).resumed, 1);

    let wielded = Wielded {
        slot: 0,
        item: rig.world.item(rig.player, 0).cloned(),
    };
    assert!(!gun.is_valid(&wielded));

    let rebuilt = Firearm::new(&rig.binding(0), Arc::new(FirearmTuning::carbine()), 0);
    assert_eq!(rebuilt.attachments().sight.as_deref(), Some("holo"));
    assert!(rebuilt.is_valid(&wielded));
}

#[test]
fn test_remove_flushes_magazine_and_zeroes_cooldowns() {
    let (mut rig, mut gun) = armed(FirearmTuning::carbine(), 0);
    gun.on_start_use(&mut rig.ctx()).unwrap();
    assert!(gun.magazine().unwrap().is_dirty());
    assert_eq!(expended(&rig), 0);

    gun.on_remove(&mut rig.ctx()).unwrap();
    assert_eq!(expended(&rig), 1);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:carbine_a"), 0);
    assert_eq!(rig.world.cooldown(rig.player, "arsenal:carbine_b"), 0);
    assert_eq!(gun.state(), FirearmState::Idle);
}

#[test]
fn test_status_text() {
    let mut rig = Rig::new();
    rig.give(0, ItemSnapshot::new("arsenal:pulse_pistol"));
    rig.give(MAG_SLOT, ItemSnapshot::new("arsenal:pulse_cell_pack").with_durability(2, 12));
    rig.give(AMMO_SLOT, ItemSnapshot::stack("arsenal:pulse_cell", 7));
    let mut gun = Firearm::new(&rig.binding(0), Arc::new(FirearmTuning::pulse_pistol()), 10);

    rig.ticks(&mut gun, 10);
    assert!(rig
        .world
        .journal()
        .iter()
        .any(|e| matches!(e, WorldEvent::Status { text, .. } if text == "Pulse pistol 10/12 [7]")));
}
