mod support;

use std::collections::HashSet;
use std::time::Duration;

use flowchart_client::render::{
    DiagramRenderer, DiagramTarget, RenderDisposition, RenderOutput, PLACEHOLDER_DIAGRAM,
};

use support::ScriptedEngine;

fn svg_of(target: &DiagramTarget) -> String {
    match target.current() {
        Some(RenderOutput::Diagram(artifact)) => artifact.svg,
        other => panic!("expected a diagram, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_newer_render_wins_when_older_finishes_last() {
    let engine = ScriptedEngine::new(&[
        ("graph TD; A-->B", Duration::from_millis(500)),
        ("graph TD; B-->C", Duration::from_millis(100)),
    ]);
    let renderer = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    let first = renderer.render("graph TD; A-->B", &target);
    let second = renderer.render("graph TD; B-->C", &target);
    let second_token = second.token().clone();

    assert_eq!(second.wait().await, RenderDisposition::Applied);
    assert_eq!(first.wait().await, RenderDisposition::Superseded);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(svg_of(&target), "<svg>graph TD; B-->C</svg>");
    assert_eq!(target.current().unwrap().token(), &second_token);
    assert_eq!(target.writes(), 1);
    assert_eq!(renderer.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_newer_render_wins_when_older_finishes_first() {
    let engine = ScriptedEngine::new(&[
        ("graph TD; A-->B", Duration::from_millis(100)),
        ("graph TD; B-->C", Duration::from_millis(500)),
    ]);
    let renderer = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    let first = renderer.render("graph TD; A-->B", &target);
    let second = renderer.render("graph TD; B-->C", &target);

    assert_eq!(first.wait().await, RenderDisposition::Superseded);
    assert_eq!(second.wait().await, RenderDisposition::Applied);
    assert_eq!(svg_of(&target), "<svg>graph TD; B-->C</svg>");
    assert_eq!(target.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_renders_each_apply() {
    let engine = ScriptedEngine::new(&[]);
    let renderer = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    renderer.render("graph TD; A-->B", &target).wait().await;
    assert_eq!(svg_of(&target), "<svg>graph TD; A-->B</svg>");
    renderer.render("graph TD; B-->C", &target).wait().await;
    assert_eq!(svg_of(&target), "<svg>graph TD; B-->C</svg>");
    assert_eq!(target.writes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_blank_descriptions_draw_the_placeholder() {
    for description in ["", "   \n\t"] {
        let engine = ScriptedEngine::new(&[]);
        let renderer = DiagramRenderer::new(engine.clone());
        let target = DiagramTarget::new();

        assert_eq!(
            renderer.render(description, &target).wait().await,
            RenderDisposition::Applied
        );
        assert_eq!(*engine.seen.lock(), vec![PLACEHOLDER_DIAGRAM.to_string()]);
        assert!(!target.current().unwrap().is_error());
    }
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_becomes_inline_error() {
    let engine = ScriptedEngine::new(&[]);
    let renderer = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    let ticket = renderer.render("bad diagram", &target);
    let token = ticket.token().clone();
    assert_eq!(ticket.wait().await, RenderDisposition::Applied);

    match target.current() {
        Some(RenderOutput::Error { token: shown, message }) => {
            assert_eq!(shown, token);
            assert!(message.contains("cannot draw bad diagram"), "{message}");
        }
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_affect_other_targets() {
    let engine = ScriptedEngine::new(&[("bad one", Duration::from_millis(50))]);
    let renderer = DiagramRenderer::new(engine.clone());
    let broken = DiagramTarget::new();
    let healthy = DiagramTarget::new();

    let a = renderer.render("bad one", &broken);
    let b = renderer.render("graph LR; X-->Y", &healthy);
    assert_eq!(a.wait().await, RenderDisposition::Applied);
    assert_eq!(b.wait().await, RenderDisposition::Applied);

    assert!(broken.current().unwrap().is_error());
    assert_eq!(svg_of(&healthy), "<svg>graph LR; X-->Y</svg>");
}

#[tokio::test(start_paused = true)]
async fn test_tokens_are_unique_across_calls_and_renderers() {
    let engine = ScriptedEngine::new(&[]);
    let first = DiagramRenderer::new(engine.clone());
    let second = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    let mut tokens = HashSet::new();
    let mut tickets = Vec::new();
    for i in 0..20 {
        let renderer = if i % 2 == 0 { &first } else { &second };
        let ticket = renderer.render("graph TD; A-->B", &target);
        assert!(tokens.insert(ticket.token().clone()));
        tickets.push(ticket);
    }
    let last = tickets.last().unwrap().token().clone();
    for ticket in tickets {
        ticket.wait().await;
    }
    assert_eq!(target.current().unwrap().token(), &last);
    assert_eq!(target.writes(), 1);
    assert_eq!(first.pending(), 0);
    assert_eq!(second.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_newer_render_wins_across_renderers() {
    let engine = ScriptedEngine::new(&[
        ("graph TD; A-->B", Duration::from_millis(500)),
        ("graph TD; B-->C", Duration::from_millis(100)),
    ]);
    let board_renderer = DiagramRenderer::new(engine.clone());
    let preview_renderer = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    let slow = board_renderer.render("graph TD; A-->B", &target);
    let fast = preview_renderer.render("graph TD; B-->C", &target);
    let fast_token = fast.token().clone();

    assert_eq!(fast.wait().await, RenderDisposition::Applied);
    assert_eq!(slow.wait().await, RenderDisposition::Superseded);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(svg_of(&target), "<svg>graph TD; B-->C</svg>");
    assert_eq!(target.current().unwrap().token(), &fast_token);
    assert_eq!(target.writes(), 1);
    assert_eq!(board_renderer.pending(), 0);
    assert_eq!(preview_renderer.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_from_another_renderer_drops_pending_render() {
    let engine = ScriptedEngine::new(&[("graph TD; A-->B", Duration::from_millis(300))]);
    let first = DiagramRenderer::new(engine.clone());
    let second = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    let ticket = first.render("graph TD; A-->B", &target);
    second.cancel(&target);

    assert_eq!(ticket.wait().await, RenderDisposition::Superseded);
    assert!(target.current().is_none());
    assert_eq!(first.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_leaves_target_untouched() {
    let engine = ScriptedEngine::new(&[("graph TD; A-->B", Duration::from_millis(300))]);
    let renderer = DiagramRenderer::new(engine.clone());
    let target = DiagramTarget::new();

    let ticket = renderer.render("graph TD; A-->B", &target);
    tokio::time::sleep(Duration::from_millis(100)).await;
    renderer.cancel(&target);

    assert_eq!(ticket.wait().await, RenderDisposition::Superseded);
    assert!(target.current().is_none());
    assert_eq!(renderer.pending(), 0);
}
