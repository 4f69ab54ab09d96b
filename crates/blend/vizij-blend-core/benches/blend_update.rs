use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vizij_blend::{
    BlendEngine, BlendSpec, NoClips, Planar2dSpec, PlanarSample, SourceRef, Threshold1dSpec,
    ThresholdSample,
};
use vizij_params::ParamContext;

fn threshold_engine(samples: usize) -> BlendEngine {
    let spec = BlendSpec::Threshold1d(Threshold1dSpec {
        parameter: "speed".into(),
        samples: (0..samples)
            .map(|i| ThresholdSample {
                threshold: i as f32,
                source: Some(SourceRef::Id(i as u32)),
            })
            .collect(),
        smooth_time: 0.1,
        remap: None,
    });
    BlendEngine::compile(&spec).expect("threshold spec compiles")
}

fn directional_engine(ring: usize) -> BlendEngine {
    let mut samples = vec![PlanarSample {
        position: [0.0, 0.0],
        source: Some(SourceRef::Id(0)),
    }];
    for i in 0..ring {
        let a = i as f32 / ring as f32 * std::f32::consts::TAU;
        samples.push(PlanarSample {
            position: [a.cos(), a.sin()],
            source: Some(SourceRef::Id(i as u32 + 1)),
        });
    }
    let spec = BlendSpec::Triangulated2d(Planar2dSpec {
        x: "move_x".into(),
        y: "move_y".into(),
        samples,
        smooth_time: 0.1,
    });
    BlendEngine::compile(&spec).expect("2d spec compiles")
}

fn bench_blend_update(c: &mut Criterion) {
    let dt = 1.0 / 60.0;

    let engine = threshold_engine(16);
    let mut rt = engine.init_runtime(&NoClips);
    let mut ctx = ParamContext::new();
    c.bench_function("threshold_1d_16", |b| {
        let mut t = 0.0f32;
        b.iter(|| {
            t = (t + 0.37) % 15.0;
            ctx.set_float("speed", t);
            engine.update_weights(&mut rt, black_box(&ctx), dt);
        })
    });

    let engine = directional_engine(8);
    let mut rt = engine.init_runtime(&NoClips);
    let mut ctx = ParamContext::new();
    c.bench_function("triangulated_2d_8", |b| {
        let mut a = 0.0f32;
        b.iter(|| {
            a += 0.05;
            ctx.set_float("move_x", a.cos() * 0.7);
            ctx.set_float("move_y", a.sin() * 0.7);
            engine.update_weights(&mut rt, black_box(&ctx), dt);
        })
    });
}

criterion_group!(benches, bench_blend_update);
criterion_main!(benches);
