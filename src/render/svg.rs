// ABOUTME: Built-in diagram engine: layered layout of a parsed flowchart rendered as SVG
// ABOUTME: Ranks nodes by longest path, stacks ranks along the flow direction

use std::fmt::Write;

use async_trait::async_trait;

use super::engine::{Artifact, DiagramEngine, RenderToken};
use super::flowchart::{self, ArrowHead, Direction, Flowchart, NodeShape, Stroke};
use crate::error::RenderError;

const MARGIN: f64 = 20.0;
const NODE_HEIGHT: f64 = 40.0;
const MIN_NODE_WIDTH: f64 = 60.0;
const CHAR_WIDTH: f64 = 8.0;
const LABEL_PADDING: f64 = 16.0;
const RANK_GAP: f64 = 50.0;
const SIBLING_GAP: f64 = 30.0;

/// Parses and lays out in-process; no external tooling required.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinEngine;

#[async_trait]
impl DiagramEngine for BuiltinEngine {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn render(&self, token: &RenderToken, description: &str) -> Result<Artifact, RenderError> {
        let token = token.clone();
        let description = description.to_string();
        tokio::task::spawn_blocking(move || {
            let chart = flowchart::parse(&description)?;
            let svg = to_svg(&chart, &token);
            Ok(Artifact { token, svg })
        })
        .await
        .map_err(|e| RenderError::Engine(format!("layout task failed: {}", e)))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub nodes: Vec<Placement>,
    pub width: f64,
    pub height: f64,
}

/// Longest-path rank of every node, ignoring edges that close a cycle.
pub fn ranks(chart: &Flowchart) -> Vec<usize> {
    let n = chart.nodes.len();
    let mut outgoing = vec![Vec::new(); n];
    for (i, edge) in chart.edges.iter().enumerate() {
        outgoing[edge.from].push(i);
    }

    // Iterative DFS marking back edges: 0 = unvisited, 1 = on stack, 2 = done.
    let mut state = vec![0u8; n];
    let mut back_edge = vec![false; chart.edges.len()];
    for root in 0..n {
        if state[root] != 0 {
            continue;
        }
        let mut stack = vec![(root, 0usize)];
        state[root] = 1;
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&edge) = outgoing[node].get(top.1) {
                top.1 += 1;
                let to = chart.edges[edge].to;
                match state[to] {
                    0 => {
                        state[to] = 1;
                        stack.push((to, 0));
                    }
                    1 => back_edge[edge] = true,
                    _ => {}
                }
            } else {
                state[node] = 2;
                stack.pop();
            }
        }
    }

    // Kahn's order over the remaining DAG, relaxing ranks as we go.
    let mut indegree = vec![0usize; n];
    for (i, edge) in chart.edges.iter().enumerate() {
        if !back_edge[i] {
            indegree[edge.to] += 1;
        }
    }
    let mut queue: std::collections::VecDeque<usize> =
        (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut rank = vec![0usize; n];
    while let Some(node) = queue.pop_front() {
        for &edge in &outgoing[node] {
            if back_edge[edge] {
                continue;
            }
            let to = chart.edges[edge].to;
            rank[to] = rank[to].max(rank[node] + 1);
            indegree[to] -= 1;
            if indegree[to] == 0 {
                queue.push_back(to);
            }
        }
    }
    rank
}

fn node_size(label: &str, shape: NodeShape) -> (f64, f64) {
    let text = label.chars().count() as f64 * CHAR_WIDTH + 2.0 * LABEL_PADDING;
    let width = text.max(MIN_NODE_WIDTH);
    match shape {
        NodeShape::Circle | NodeShape::DoubleCircle => {
            let d = width.max(NODE_HEIGHT);
            (d, d)
        }
        NodeShape::Rhombus => (width * 1.4, NODE_HEIGHT * 1.6),
        NodeShape::Hexagon => (width + NODE_HEIGHT / 2.0, NODE_HEIGHT),
        _ => (width, NODE_HEIGHT),
    }
}

pub fn layout(chart: &Flowchart) -> Layout {
    let rank = ranks(chart);
    let rank_count = rank.iter().copied().max().map_or(0, |r| r + 1);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
    for (node, &r) in rank.iter().enumerate() {
        layers[r].push(node);
    }

    let sizes: Vec<(f64, f64)> = chart
        .nodes
        .iter()
        .map(|node| node_size(&node.label, node.shape))
        .collect();
    let horizontal = chart.direction.is_horizontal();
    // Along: the flow axis. Across: the axis siblings are spread on.
    let along = |i: usize| if horizontal { sizes[i].0 } else { sizes[i].1 };
    let across = |i: usize| if horizontal { sizes[i].1 } else { sizes[i].0 };

    let thickness: Vec<f64> = layers
        .iter()
        .map(|layer| layer.iter().map(|&i| along(i)).fold(0.0, f64::max))
        .collect();
    let spans: Vec<f64> = layers
        .iter()
        .map(|layer| {
            let total: f64 = layer.iter().map(|&i| across(i)).sum();
            total + SIBLING_GAP * layer.len().saturating_sub(1) as f64
        })
        .collect();
    let max_span = spans.iter().copied().fold(0.0, f64::max);

    let mut along_pos = vec![0.0; chart.nodes.len()];
    let mut across_pos = vec![0.0; chart.nodes.len()];
    let mut offset = MARGIN;
    for (r, layer) in layers.iter().enumerate() {
        let mut cursor = MARGIN + (max_span - spans[r]) / 2.0;
        for &i in layer {
            along_pos[i] = offset + thickness[r] / 2.0;
            across_pos[i] = cursor + across(i) / 2.0;
            cursor += across(i) + SIBLING_GAP;
        }
        offset += thickness[r] + RANK_GAP;
    }
    let along_extent = if layers.is_empty() {
        2.0 * MARGIN
    } else {
        offset - RANK_GAP + MARGIN
    };
    let across_extent = max_span + 2.0 * MARGIN;

    let (width, height) = if horizontal {
        (along_extent, across_extent)
    } else {
        (across_extent, along_extent)
    };

    let nodes = (0..chart.nodes.len())
        .map(|i| {
            let (mut cx, mut cy) = if horizontal {
                (along_pos[i], across_pos[i])
            } else {
                (across_pos[i], along_pos[i])
            };
            match chart.direction {
                Direction::BottomUp => cy = height - cy,
                Direction::RightLeft => cx = width - cx,
                _ => {}
            }
            Placement {
                cx,
                cy,
                width: sizes[i].0,
                height: sizes[i].1,
            }
        })
        .collect();

    Layout {
        nodes,
        width,
        height,
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Point where the segment from `p`'s centre towards `(tx, ty)` leaves its box.
fn boundary(p: &Placement, tx: f64, ty: f64) -> (f64, f64) {
    let (dx, dy) = (tx - p.cx, ty - p.cy);
    if dx == 0.0 && dy == 0.0 {
        return (p.cx, p.cy);
    }
    let sx = if dx == 0.0 { f64::INFINITY } else { (p.width / 2.0) / dx.abs() };
    let sy = if dy == 0.0 { f64::INFINITY } else { (p.height / 2.0) / dy.abs() };
    let t = sx.min(sy);
    (p.cx + dx * t, p.cy + dy * t)
}

fn shape_svg(out: &mut String, shape: NodeShape, p: &Placement) {
    let (x, y, w, h) = (p.cx - p.width / 2.0, p.cy - p.height / 2.0, p.width, p.height);
    let polygon = |out: &mut String, points: &[(f64, f64)]| {
        let pts: Vec<String> = points.iter().map(|(px, py)| format!("{:.1},{:.1}", px, py)).collect();
        let _ = writeln!(out, r#"<polygon class="node" points="{}"/>"#, pts.join(" "));
    };
    let _ = match shape {
        NodeShape::Rect => writeln!(out, r#"<rect class="node" x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}"/>"#, x, y, w, h),
        NodeShape::Round => writeln!(out, r#"<rect class="node" x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" rx="8"/>"#, x, y, w, h),
        NodeShape::Stadium => writeln!(out, r#"<rect class="node" x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" rx="{:.1}"/>"#, x, y, w, h, h / 2.0),
        NodeShape::Cylinder => writeln!(out, r#"<rect class="node" x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" rx="{:.1}" ry="8"/>"#, x, y, w, h, w / 2.0),
        NodeShape::Subroutine => writeln!(
            out,
            r#"<rect class="node" x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}"/><path class="node-detail" d="M{l:.1},{y:.1} V{b:.1} M{r:.1},{y:.1} V{b:.1}"/>"#,
            l = x + 8.0,
            r = x + w - 8.0,
            b = y + h,
        ),
        NodeShape::Circle => writeln!(out, r#"<circle class="node" cx="{:.1}" cy="{:.1}" r="{:.1}"/>"#, p.cx, p.cy, w / 2.0),
        NodeShape::DoubleCircle => writeln!(
            out,
            r#"<circle class="node" cx="{cx:.1}" cy="{cy:.1}" r="{r:.1}"/><circle class="node" cx="{cx:.1}" cy="{cy:.1}" r="{inner:.1}"/>"#,
            cx = p.cx,
            cy = p.cy,
            r = w / 2.0,
            inner = w / 2.0 - 4.0,
        ),
        NodeShape::Rhombus => {
            polygon(out, &[(p.cx, y), (x + w, p.cy), (p.cx, y + h), (x, p.cy)]);
            Ok(())
        }
        NodeShape::Hexagon => {
            let inset = h / 2.0;
            polygon(out, &[(x + inset, y), (x + w - inset, y), (x + w, p.cy), (x + w - inset, y + h), (x + inset, y + h), (x, p.cy)]);
            Ok(())
        }
        NodeShape::Parallelogram => {
            polygon(out, &[(x + 10.0, y), (x + w, y), (x + w - 10.0, y + h), (x, y + h)]);
            Ok(())
        }
        NodeShape::ParallelogramAlt => {
            polygon(out, &[(x, y), (x + w - 10.0, y), (x + w, y + h), (x + 10.0, y + h)]);
            Ok(())
        }
        NodeShape::Trapezoid => {
            polygon(out, &[(x + 10.0, y), (x + w - 10.0, y), (x + w, y + h), (x, y + h)]);
            Ok(())
        }
        NodeShape::TrapezoidAlt => {
            polygon(out, &[(x, y), (x + w, y), (x + w - 10.0, y + h), (x + 10.0, y + h)]);
            Ok(())
        }
        NodeShape::Asymmetric => {
            polygon(out, &[(x, y), (x + w, y), (x + w, y + h), (x, y + h), (x + 12.0, p.cy)]);
            Ok(())
        }
    };
}

/// Renders `chart` as a standalone SVG document whose root and marker ids
/// are derived from `token`.
pub fn to_svg(chart: &Flowchart, token: &RenderToken) -> String {
    let layout = layout(chart);
    let id = escape(token.as_str());
    let mut out = String::new();

    let _ = writeln!(
        out,
        r#"<svg id="{id}" xmlns="http://www.w3.org/2000/svg" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.1} {h:.1}" role="img">"#,
        w = layout.width,
        h = layout.height,
    );
    let _ = writeln!(
        out,
        "<style>#{id} .node{{fill:#ECECFF;stroke:#9370DB;stroke-width:1}} \
         #{id} .node-detail{{fill:none;stroke:#9370DB}} \
         #{id} .edge{{fill:none;stroke:#333;stroke-width:1.5}} \
         #{id} .edge.dotted{{stroke-dasharray:3 3}} \
         #{id} .edge.thick{{stroke-width:3.5}} \
         #{id} text{{font-family:sans-serif;font-size:14px;fill:#333}} \
         #{id} .edge-label{{font-size:12px}}</style>"
    );
    let _ = writeln!(
        out,
        r##"<defs><marker id="{id}-arrow" viewBox="0 0 10 10" refX="10" refY="5" markerWidth="8" markerHeight="8" orient="auto"><path d="M0,0 L10,5 L0,10 z" fill="#333"/></marker><marker id="{id}-circle" viewBox="0 0 10 10" refX="9" refY="5" markerWidth="8" markerHeight="8" orient="auto"><circle cx="5" cy="5" r="4" fill="#fff" stroke="#333"/></marker><marker id="{id}-cross" viewBox="0 0 10 10" refX="9" refY="5" markerWidth="8" markerHeight="8" orient="auto"><path d="M1,1 L9,9 M9,1 L1,9" stroke="#333" stroke-width="2"/></marker></defs>"##
    );

    out.push_str("<g class=\"edges\">\n");
    for edge in &chart.edges {
        if edge.stroke == Stroke::Invisible {
            continue;
        }
        let (from, to) = (&layout.nodes[edge.from], &layout.nodes[edge.to]);
        let class = match edge.stroke {
            Stroke::Dotted => "edge dotted",
            Stroke::Thick => "edge thick",
            _ => "edge",
        };
        let marker = match edge.head {
            ArrowHead::None => String::new(),
            ArrowHead::Arrow => format!(r#" marker-end="url(#{id}-arrow)""#),
            ArrowHead::Circle => format!(r#" marker-end="url(#{id}-circle)""#),
            ArrowHead::Cross => format!(r#" marker-end="url(#{id}-cross)""#),
        };

        let (label_x, label_y) = if edge.from == edge.to {
            let (rx, ty) = (from.cx + from.width / 2.0, from.cy - from.height / 4.0);
            let by = from.cy + from.height / 4.0;
            let _ = writeln!(
                out,
                r#"<path class="{class}" d="M{rx:.1},{ty:.1} C{c:.1},{ty:.1} {c:.1},{by:.1} {rx:.1},{by:.1}"{marker}/>"#,
                c = rx + 30.0,
            );
            (rx + 34.0, from.cy)
        } else {
            let (x1, y1) = boundary(from, to.cx, to.cy);
            let (x2, y2) = boundary(to, from.cx, from.cy);
            let _ = writeln!(
                out,
                r#"<line class="{class}" x1="{x1:.1}" y1="{y1:.1}" x2="{x2:.1}" y2="{y2:.1}"{marker}/>"#
            );
            ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
        };

        if let Some(label) = edge.label.as_deref().filter(|l| !l.is_empty()) {
            let _ = writeln!(
                out,
                r#"<text class="edge-label" x="{label_x:.1}" y="{label_y:.1}" text-anchor="middle" dominant-baseline="middle">{}</text>"#,
                escape(label)
            );
        }
    }
    out.push_str("</g>\n<g class=\"nodes\">\n");

    for (node, placement) in chart.nodes.iter().zip(&layout.nodes) {
        let _ = writeln!(out, r#"<g class="flowchart-node" data-id="{}">"#, escape(&node.id));
        shape_svg(&mut out, node.shape, placement);
        let _ = writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" dominant-baseline="middle">{}</text></g>"#,
            placement.cx,
            placement.cy,
            escape(&node.label)
        );
    }
    out.push_str("</g>\n</svg>\n");
    out
}
