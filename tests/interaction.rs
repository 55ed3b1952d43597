mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{reference_frame, rig, rig_with_focus, CyclingProbe, FlakyFocus, FocusLostAfter, Input};
use gatherbot_lib::agent_engine::state::{AbandonReason, CycleOutcome};
use gatherbot_lib::config::InteractionConfig;
use gatherbot_lib::executor::input::MouseButton;
use gatherbot_lib::perception::coords::AxisScaling;
use gatherbot_lib::perception::selector;
use gatherbot_lib::perception::types::{AgentAnchor, Point};

fn quiet_config() -> InteractionConfig {
    InteractionConfig {
        hide_overlay: false,
        ..InteractionConfig::default()
    }
}

#[test]
fn reference_detection_maps_into_window() {
    let frame = reference_frame();
    let anchor = AgentAnchor(Point::new(20.0, 20.0));

    let target = selector::select(&frame, anchor, AxisScaling::Symmetric).unwrap();
    assert_eq!(target.center, Point::new(20.0, 20.0));
    assert_eq!(target.actuation.x, 125.0);
    assert_eq!(target.actuation.y, 18.75);

    let legacy = selector::select(&frame, anchor, AxisScaling::LegacyUnscaledY).unwrap();
    assert_eq!(legacy.actuation, Point::new(125.0, 20.0));
}

#[tokio::test(start_paused = true)]
async fn cycle_clicks_the_mapped_point() {
    let mut rig = rig(CyclingProbe::instant_success(), quiet_config());
    rig.clock.set(50_000);

    assert_eq!(rig.interaction.run_cycle().await, CycleOutcome::Completed);
    assert_eq!(rig.interaction.counters().resources_gathered, 1);
    assert_eq!(rig.activity.last_action_ms(), 50_000);

    let inputs = rig.actuator.inputs();
    let target = inputs
        .iter()
        .position(|i| *i == Input::Move(Point::new(125.0, 18.75)))
        .expect("pointer moved to the target");
    assert_eq!(inputs[target + 1], Input::Click(MouseButton::Left));
}

#[tokio::test(start_paused = true)]
async fn retry_ceiling_resets_then_searches_again() {
    let mut rig = rig(CyclingProbe::never_finishes(), quiet_config());

    for attempt in 1..=3u32 {
        assert_eq!(
            rig.interaction.run_cycle().await,
            CycleOutcome::abandoned(AbandonReason::ActingTimeout)
        );
        assert_eq!(rig.interaction.counters().mining_attempts, attempt);
    }
    assert_eq!(rig.detections.load(Ordering::SeqCst), 3);

    assert_eq!(
        rig.interaction.run_cycle().await,
        CycleOutcome::abandoned(AbandonReason::RetryCeiling)
    );
    assert_eq!(rig.interaction.counters().mining_attempts, 0);
    assert_eq!(rig.detections.load(Ordering::SeqCst), 3);

    rig.interaction.run_cycle().await;
    assert_eq!(rig.detections.load(Ordering::SeqCst), 4);
    assert_eq!(rig.interaction.counters().mining_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn full_inventory_never_searches() {
    let cfg = InteractionConfig {
        inventory_limit: 2,
        ..quiet_config()
    };
    let mut rig = rig(CyclingProbe::instant_success(), cfg);

    assert_eq!(rig.interaction.run_cycle().await, CycleOutcome::Completed);
    assert_eq!(rig.interaction.run_cycle().await, CycleOutcome::Completed);
    assert!(rig.interaction.inventory_full());

    assert_eq!(rig.interaction.run_cycle().await, CycleOutcome::InventoryFull);
    assert_eq!(rig.detections.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn overlay_is_toggled_around_each_approach() {
    let mut rig = rig(CyclingProbe::instant_success(), InteractionConfig::default());
    rig.interaction.run_cycle().await;

    let toggles = rig
        .actuator
        .inputs()
        .into_iter()
        .filter(|i| matches!(i, Input::Hotkey(_)))
        .count();
    assert_eq!(toggles, 2);

    // Nothing left to restore after a clean cycle.
    rig.interaction.restore_presentation().await;
    let toggles_after = rig
        .actuator
        .inputs()
        .into_iter()
        .filter(|i| matches!(i, Input::Hotkey(_)))
        .count();
    assert_eq!(toggles_after, 2);
}

#[tokio::test(start_paused = true)]
async fn background_window_gets_no_input() {
    let focus = FlakyFocus::new(usize::MAX);
    let checks = focus.checks.clone();
    let mut rig = rig_with_focus(CyclingProbe::instant_success(), quiet_config(), Box::new(focus));

    let started = tokio::time::Instant::now();
    assert_eq!(
        rig.interaction.run_cycle().await,
        CycleOutcome::abandoned(AbandonReason::Unfocused)
    );
    assert!(rig.actuator.inputs().is_empty());
    assert_eq!(checks.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert_eq!(rig.interaction.counters().mining_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn focus_regained_between_checks_lets_the_cycle_run() {
    let focus = FlakyFocus::new(2);
    let checks = focus.checks.clone();
    let mut rig = rig_with_focus(CyclingProbe::instant_success(), quiet_config(), Box::new(focus));

    assert_eq!(rig.interaction.run_cycle().await, CycleOutcome::Completed);
    assert_eq!(checks.load(Ordering::SeqCst), 3);
    assert!(rig
        .actuator
        .inputs()
        .contains(&Input::Click(MouseButton::Left)));
}

#[tokio::test(start_paused = true)]
async fn focus_lost_mid_approach_skips_reclick_and_overlay() {
    let mut rig = rig_with_focus(
        CyclingProbe::new(vec![false]),
        InteractionConfig::default(),
        Box::new(FocusLostAfter::new(2)),
    );

    assert_eq!(
        rig.interaction.run_cycle().await,
        CycleOutcome::abandoned(AbandonReason::Unfocused)
    );
    let inputs = rig.actuator.inputs();
    let clicks = inputs
        .iter()
        .filter(|i| **i == Input::Click(MouseButton::Left))
        .count();
    let toggles = inputs
        .iter()
        .filter(|i| matches!(i, Input::Hotkey(_)))
        .count();
    assert_eq!(clicks, 1);
    assert_eq!(toggles, 1);
    // Left hidden until the window is back in front.
    assert!(rig.interaction.overlay_hidden());
}
