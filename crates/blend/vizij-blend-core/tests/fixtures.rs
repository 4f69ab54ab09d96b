use vizij_blend::{BlendEngine, BlendSpec, NoClips};
use vizij_params::ParamContext;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-4
}

fn load(name: &str) -> BlendEngine {
    let spec: BlendSpec = vizij_test_fixtures::blend_specs::load(name).expect("load blend spec fixture");
    BlendEngine::compile(&spec).expect("compile blend spec fixture")
}

#[test]
fn every_blend_fixture_compiles() {
    for key in vizij_test_fixtures::blend_specs::keys() {
        let spec: BlendSpec = vizij_test_fixtures::blend_specs::load(&key).unwrap();
        assert!(BlendEngine::compile(&spec).is_ok(), "fixture {key} failed to compile");
    }
}

#[test]
fn directional_fixture_blends_inside_a_triangle() {
    let engine = load("directional");
    assert_eq!(engine.kind(), "triangulated_2d");
    let mut rt = engine.init_runtime(&NoClips);
    let mut ctx = ParamContext::new();

    ctx.set_float("move_y", 1.0);
    engine.update_weights(&mut rt, &ctx, 1.0 / 60.0);
    assert!(approx(rt.weights()[1], 1.0), "{:?}", rt.weights());

    ctx.set_float("move_x", 0.25);
    ctx.set_float("move_y", 0.5);
    engine.immediate_update(&mut rt, &ctx);
    let w = rt.weights();
    assert!(approx(w[0], 0.25), "{w:?}");
    assert!(approx(w[1], 0.5), "{w:?}");
    assert!(approx(w[2], 0.25), "{w:?}");
    assert!(approx(w.iter().sum::<f32>(), 1.0));
}

#[test]
fn attack_fixture_holds_main_until_release() {
    let engine = load("attack-phase4");
    let mut rt = engine.init_runtime(&NoClips);
    let mut ctx = ParamContext::new();
    ctx.set_bool("attack_held", true);

    for _ in 0..20 {
        engine.update_weights(&mut rt, &ctx, 0.05);
    }
    let status = rt.phase().unwrap();
    assert_eq!(engine.phase_name(status.index), Some("main"));
    assert!(!status.completed);

    ctx.set_bool("attack_held", false);
    let mut visited = Vec::new();
    for _ in 0..20 {
        engine.update_weights(&mut rt, &ctx, 0.05);
        let status = rt.phase().unwrap();
        if visited.last() != Some(&status.index) {
            visited.push(status.index);
        }
        if status.completed {
            break;
        }
    }
    assert_eq!(visited.last(), Some(&3));
    assert!(rt.phase().unwrap().completed);
    assert!(approx(rt.weights()[3], 1.0), "{:?}", rt.weights());
}
