use segue::{
    HeadlessContextProvider, RendererState, ShaderStage, TimeBase, Timestamp, TransitionConfig,
    TransitionError, TransitionRenderer, TransitionSource, VideoFrame,
};

const SIZE: u32 = 64;

fn checkerboard() -> VideoFrame {
    let mut frame = VideoFrame::new(SIZE, SIZE);
    for (i, px) in frame.data.chunks_exact_mut(3).enumerate() {
        let x = i as u32 % SIZE;
        let y = i as u32 / SIZE;
        let on = ((x / 8) + (y / 8)) % 2 == 0;
        px.copy_from_slice(if on { &[250, 20, 90] } else { &[10, 200, 40] });
    }
    frame
}

fn hardware_renderer(config: TransitionConfig) -> Option<TransitionRenderer> {
    let mut renderer =
        TransitionRenderer::with_provider(config, HeadlessContextProvider { allow_fallback: true });
    match renderer.configure(SIZE, SIZE) {
        Ok(()) => Some(renderer),
        Err(TransitionError::ContextCreationFailed(e)) => {
            eprintln!("skipping: no rendering context ({e})");
            None
        }
        Err(e) => panic!("configure failed: {e}"),
    }
}

#[test]
fn pass_through_over_a_one_second_transition() {
    let Some(mut renderer) = hardware_renderer(TransitionConfig::new(1.0, 0.0).unwrap()) else {
        return;
    };

    // Millisecond time base, as a container would hand over
    let time_base = TimeBase::new(1, 1000);
    let input = checkerboard();
    let mut progress = Vec::new();

    for pts in [0, 500, 1000, 2000] {
        let frame = input.clone().with_pts(Timestamp::new(pts, time_base));
        let seconds = frame.pts.map(|t| t.seconds()).unwrap();
        let output = renderer.render(&frame, seconds).unwrap();

        assert_eq!((output.width, output.height), (SIZE, SIZE));
        assert_eq!(output.data, input.data, "pts {pts} was not passed through");
        assert_eq!(output.pts, frame.pts);
        progress.push(renderer.progress().unwrap());
    }

    assert_eq!(progress, vec![0.0, 0.5, 1.0, 1.0]);
    renderer.teardown();
    assert_eq!(renderer.state(), RendererState::Destroyed);
}

#[test]
fn offset_delays_the_transition() {
    let config = TransitionConfig::new(2.0, 1.0)
        .unwrap()
        .with_source(TransitionSource::Inline(
            "vec4 transition(vec2 uv) { return mix(texture2D(to, uv), vec4(1.0), progress); }".into(),
        ));
    let Some(mut renderer) = hardware_renderer(config) else {
        return;
    };
    let input = checkerboard();

    let before = renderer.render(&input, 0.5).unwrap();
    assert_eq!(before.data, input.data);
    let after = renderer.render(&input, 3.0).unwrap();
    assert!(after.data.iter().all(|&b| b == 255));
}

#[test]
fn malformed_snippet_reports_fragment_stage() {
    let config = TransitionConfig::default().with_source(TransitionSource::Inline(
        "vec4 transition(vec2 uv) { return vec4(uv, 0.0) }".into(),
    ));
    let mut renderer = TransitionRenderer::new(config);

    match renderer.configure(SIZE, SIZE) {
        Err(TransitionError::ShaderCompileFailed { stage, diagnostic }) => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(!diagnostic.is_empty());
        }
        other => panic!("expected a fragment compile failure, got {other:?}"),
    }
    assert_eq!(renderer.state(), RendererState::Failed);
    assert!(matches!(
        renderer.render(&checkerboard(), 0.0),
        Err(TransitionError::NotConfigured)
    ));
}

#[test]
fn teardown_twice_is_harmless() {
    let mut renderer = TransitionRenderer::new(TransitionConfig::default());
    renderer.teardown();
    renderer.teardown();
    assert_eq!(renderer.state(), RendererState::Uninitialized);

    let Some(mut renderer) = hardware_renderer(TransitionConfig::default()) else {
        return;
    };
    renderer.teardown();
    renderer.teardown();
    assert_eq!(renderer.state(), RendererState::Destroyed);
}
