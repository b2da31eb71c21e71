//! 다이어그램 필요 판단 + SVG 렌더링
//!
//! 판단은 키워드 규칙 목록을 순서대로 검사해 첫 매치를 씁니다
//! (기하 → 함수 그래프 → 데이터 차트).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::expr::Expr;
use super::DiagramRenderer;

const GEOMETRY_KEYWORDS: &[&str] = &[
    "triangle", "circle", "rectangle", "square", "angle", "shape", "polygon", "area", "perimeter",
];
const GRAPH_KEYWORDS: &[&str] = &["graph", "plot", "function", "equation", "y = ", "f(x)"];
const CHART_KEYWORDS: &[&str] = &["chart", "data", "compare", "statistics"];

// ============================================================================
// Diagram Parameters
// ============================================================================

/// 기하 도형
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Shape {
    Triangle { points: [[f64; 2]; 3] },
    Circle { radius: f64 },
    Rectangle { width: f64, height: f64 },
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Triangle {
            points: [[0.0, 0.0], [4.0, 0.0], [2.0, 3.0]],
        }
    }
}

/// 다이어그램 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagramParams {
    Geometry {
        #[serde(flatten)]
        shape: Shape,
        title: String,
    },
    FunctionGraph {
        equation: String,
        x_range: (f64, f64),
        title: String,
    },
    BarChart {
        labels: Vec<String>,
        values: Vec<f64>,
        title: String,
    },
}

impl DiagramParams {
    /// 종류 문자열 ("geometry", "function_graph", "bar_chart")
    pub fn kind(&self) -> &'static str {
        match self {
            DiagramParams::Geometry { .. } => "geometry",
            DiagramParams::FunctionGraph { .. } => "function_graph",
            DiagramParams::BarChart { .. } => "bar_chart",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            DiagramParams::Geometry { title, .. }
            | DiagramParams::FunctionGraph { title, .. }
            | DiagramParams::BarChart { title, .. } => title,
        }
    }

    fn geometry() -> Self {
        DiagramParams::Geometry {
            shape: Shape::default(),
            title: "Geometric Figure".to_string(),
        }
    }

    fn function_graph() -> Self {
        DiagramParams::FunctionGraph {
            equation: "x**2".to_string(),
            x_range: (-10.0, 10.0),
            title: "Function Graph".to_string(),
        }
    }

    fn bar_chart() -> Self {
        DiagramParams::BarChart {
            labels: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
            values: vec![10.0, 20.0, 15.0, 25.0],
            title: "Data Visualization".to_string(),
        }
    }
}

/// 다이어그램이 도움이 될지 판단
///
/// 기하/차트 키워드는 질문에서만, 그래프 키워드는 질문과 응답 모두에서 찾습니다.
pub fn detect_diagram_need(query: &str, response: &str) -> Option<DiagramParams> {
    let query = query.to_lowercase();
    let response = response.to_lowercase();
    let in_query = |keywords: &[&str]| keywords.iter().any(|k| query.contains(k));

    if in_query(GEOMETRY_KEYWORDS) {
        return Some(DiagramParams::geometry());
    }

    if in_query(GRAPH_KEYWORDS) || GRAPH_KEYWORDS.iter().any(|k| response.contains(k)) {
        return Some(DiagramParams::function_graph());
    }

    if in_query(CHART_KEYWORDS) {
        return Some(DiagramParams::bar_chart());
    }

    None
}

// ============================================================================
// SVG Canvas
// ============================================================================

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;
const MARGIN: f64 = 48.0;
const GRAPH_SAMPLES: usize = 500;

/// 데이터 좌표 → 픽셀 좌표 변환
struct Viewport {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Viewport {
    fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        let widen = |lo: f64, hi: f64| if (hi - lo).abs() < f64::EPSILON { (lo - 1.0, hi + 1.0) } else { (lo, hi) };
        let (min_x, max_x) = widen(min_x, max_x);
        let (min_y, max_y) = widen(min_y, max_y);
        Self { min_x, max_x, min_y, max_y }
    }

    /// 정사각 비율 유지 (도형용)
    fn equal_aspect(mut self) -> Self {
        let plot_w = WIDTH - 2.0 * MARGIN;
        let plot_h = HEIGHT - 2.0 * MARGIN;
        let scale = ((self.max_x - self.min_x) / plot_w).max((self.max_y - self.min_y) / plot_h);

        let cx = (self.min_x + self.max_x) / 2.0;
        let cy = (self.min_y + self.max_y) / 2.0;
        self.min_x = cx - scale * plot_w / 2.0;
        self.max_x = cx + scale * plot_w / 2.0;
        self.min_y = cy - scale * plot_h / 2.0;
        self.max_y = cy + scale * plot_h / 2.0;
        self
    }

    fn px(&self, x: f64, y: f64) -> (f64, f64) {
        let sx = MARGIN + (x - self.min_x) / (self.max_x - self.min_x) * (WIDTH - 2.0 * MARGIN);
        let sy = HEIGHT - MARGIN - (y - self.min_y) / (self.max_y - self.min_y) * (HEIGHT - 2.0 * MARGIN);
        (sx, sy)
    }

    fn points(&self, data: &[(f64, f64)]) -> String {
        data.iter()
            .map(|&(x, y)| {
                let (sx, sy) = self.px(x, y);
                format!("{:.2},{:.2}", sx, sy)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 범위 안에 있으면 x=0, y=0 축선
    fn axes(&self, svg: &mut String) {
        if self.min_y <= 0.0 && 0.0 <= self.max_y {
            let (x1, y) = self.px(self.min_x, 0.0);
            let (x2, _) = self.px(self.max_x, 0.0);
            let _ = writeln!(svg, r#"<line x1="{x1:.2}" y1="{y:.2}" x2="{x2:.2}" y2="{y:.2}" stroke="black" stroke-width="0.5"/>"#);
        }
        if self.min_x <= 0.0 && 0.0 <= self.max_x {
            let (x, y1) = self.px(0.0, self.min_y);
            let (_, y2) = self.px(0.0, self.max_y);
            let _ = writeln!(svg, r#"<line x1="{x:.2}" y1="{y1:.2}" x2="{x:.2}" y2="{y2:.2}" stroke="black" stroke-width="0.5"/>"#);
        }
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn open_svg(title: &str) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="28" text-anchor="middle" font-family="sans-serif" font-size="18">{}</text>"#,
        WIDTH / 2.0,
        escape_xml(title)
    );
    svg
}

/// 파라미터 → SVG 문서
pub fn render_svg(params: &DiagramParams) -> Result<String> {
    let mut svg = open_svg(params.title());

    match params {
        DiagramParams::Geometry { shape, .. } => render_shape(&mut svg, shape),
        DiagramParams::FunctionGraph { equation, x_range, .. } => {
            render_function(&mut svg, equation, *x_range)?
        }
        DiagramParams::BarChart { labels, values, .. } => render_bars(&mut svg, labels, values)?,
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

fn render_shape(svg: &mut String, shape: &Shape) {
    let outline: Vec<(f64, f64)> = match shape {
        Shape::Triangle { points } => points.iter().map(|p| (p[0], p[1])).collect(),
        Shape::Circle { radius } => (0..100)
            .map(|i| {
                let theta = i as f64 / 100.0 * std::f64::consts::TAU;
                (radius * theta.cos(), radius * theta.sin())
            })
            .collect(),
        Shape::Rectangle { width, height } => {
            vec![(0.0, 0.0), (*width, 0.0), (*width, *height), (0.0, *height)]
        }
    };

    let (min_x, max_x) = bounds(outline.iter().map(|p| p.0));
    let (min_y, max_y) = bounds(outline.iter().map(|p| p.1));
    let pad_x = (max_x - min_x) * 0.1;
    let pad_y = (max_y - min_y) * 0.1;
    let view = Viewport::new(min_x - pad_x, max_x + pad_x, min_y - pad_y, max_y + pad_y).equal_aspect();

    view.axes(svg);
    let _ = writeln!(
        svg,
        r#"<polygon points="{}" fill="steelblue" fill-opacity="0.3" stroke="blue" stroke-width="2"/>"#,
        view.points(&outline)
    );

    if let Shape::Triangle { points } = shape {
        for p in points {
            let (x, y) = view.px(p[0], p[1]);
            let _ = writeln!(svg, r#"<circle cx="{x:.2}" cy="{y:.2}" r="4" fill="blue"/>"#);
        }
    }
}

fn render_function(svg: &mut String, equation: &str, (x_min, x_max): (f64, f64)) -> Result<()> {
    let expr = Expr::parse(equation).with_context(|| format!("Cannot plot '{}'", equation))?;

    let samples: Vec<(f64, f64)> = (0..GRAPH_SAMPLES)
        .map(|i| {
            let x = x_min + (x_max - x_min) * i as f64 / (GRAPH_SAMPLES - 1) as f64;
            (x, expr.eval(x))
        })
        .collect();

    let (min_y, max_y) = bounds(samples.iter().map(|p| p.1).filter(|y| y.is_finite()));
    if !min_y.is_finite() {
        anyhow::bail!("'{}' is undefined on [{}, {}]", equation, x_min, x_max);
    }
    let view = Viewport::new(x_min, x_max, min_y, max_y);

    view.axes(svg);

    // 정의되지 않는 구간에서 선을 끊음
    for segment in samples.split(|p| !p.1.is_finite()).filter(|s| s.len() > 1) {
        let _ = writeln!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="blue" stroke-width="2"/>"#,
            view.points(segment)
        );
    }

    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" font-family="sans-serif" font-size="14" fill="blue">y = {}</text>"#,
        WIDTH - MARGIN - 120.0,
        MARGIN + 16.0,
        escape_xml(equation)
    );
    Ok(())
}

fn render_bars(svg: &mut String, labels: &[String], values: &[f64]) -> Result<()> {
    if labels.len() != values.len() || labels.is_empty() {
        anyhow::bail!("Bar chart needs one value per label");
    }

    let max_value = values.iter().cloned().fold(0.0f64, f64::max);
    let view = Viewport::new(0.0, labels.len() as f64, 0.0, max_value.max(1.0) * 1.1);
    view.axes(svg);

    for (i, (label, value)) in labels.iter().zip(values).enumerate() {
        let (x0, y_top) = view.px(i as f64 + 0.15, value.max(0.0));
        let (x1, y_base) = view.px(i as f64 + 0.85, 0.0);
        let _ = writeln!(
            svg,
            r#"<rect x="{x0:.2}" y="{y_top:.2}" width="{:.2}" height="{:.2}" fill="steelblue" fill-opacity="0.7"/>"#,
            x1 - x0,
            y_base - y_top
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="12">{}</text>"#,
            (x0 + x1) / 2.0,
            y_base + 16.0,
            escape_xml(label)
        );
    }

    Ok(())
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

// ============================================================================
// SvgDiagramRenderer
// ============================================================================

/// SVG 파일로 다이어그램 저장
pub struct SvgDiagramRenderer {
    output_dir: PathBuf,
}

impl SvgDiagramRenderer {
    /// `<media_dir>/diagrams`에 저장
    pub fn new(media_dir: &Path) -> Self {
        Self {
            output_dir: media_dir.join("diagrams"),
        }
    }

    /// 같은 파라미터는 같은 파일 이름
    fn file_name(params: &DiagramParams) -> Result<String> {
        let encoded = serde_json::to_string(params).context("Failed to encode diagram params")?;
        let digest = format!("{:x}", Sha256::digest(encoded.as_bytes()));
        Ok(format!("diagram_{}.svg", &digest[..10]))
    }
}

#[async_trait]
impl DiagramRenderer for SvgDiagramRenderer {
    async fn render(&self, params: &DiagramParams) -> Result<PathBuf> {
        let svg = render_svg(params)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .context("Failed to create diagram directory")?;

        let path = self.output_dir.join(Self::file_name(params)?);
        tokio::fs::write(&path, svg)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;

        tracing::info!("Generated diagram: {:?}", path);
        Ok(path)
    }
}

// ============================================================================
// Tests
// ============================================================================
