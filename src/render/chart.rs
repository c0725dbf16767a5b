//! SVG charts: per-stage runtime bars and the workload-over-time plot.

use crate::config::RenderConfig;
use crate::model::{LoadSample, RuntimeRow};
use svg::Document;
use svg::node::Text as TextNode;
use svg::node::element::path::Data;
use svg::node::element::{Group, Line, Path, Rectangle, Text};

const WIDTH: f32 = 800.0;
const HEIGHT: f32 = 600.0;
const MARGIN_LEFT: f32 = 80.0;
const MARGIN_RIGHT: f32 = 30.0;
const MARGIN_TOP: f32 = 50.0;
const MARGIN_BOTTOM: f32 = 70.0;
const Y_TICKS: f32 = 8.0;

/// Plot area and data-to-pixel mapping.
struct Frame {
    x_max: f32,
    y_max: f32,
}

impl Frame {
    fn new(x_max: f32, y_max: f32) -> Self {
        Self {
            x_max: if x_max > 0.0 { x_max } else { 1.0 },
            y_max: nice_ceiling(y_max),
        }
    }

    fn width(&self) -> f32 {
        WIDTH - MARGIN_LEFT - MARGIN_RIGHT
    }

    fn height(&self) -> f32 {
        HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
    }

    fn x(&self, v: f32) -> f32 {
        MARGIN_LEFT + v / self.x_max * self.width()
    }

    fn y(&self, v: f32) -> f32 {
        MARGIN_TOP + self.height() - v / self.y_max * self.height()
    }

    fn bottom(&self) -> f32 {
        MARGIN_TOP + self.height()
    }

    /// Axis lines, y ticks with labels, optional horizontal grid.
    fn axes(&self, y_label: &str, grid: bool) -> Group {
        let mut g = Group::new()
            .add(line(MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, self.bottom(), "black", 1.0))
            .add(line(MARGIN_LEFT, self.bottom(), WIDTH - MARGIN_RIGHT, self.bottom(), "black", 1.0));

        let step = tick_step(self.y_max, Y_TICKS);
        let mut v = 0.0;
        while v <= self.y_max + step / 2.0 {
            let y = self.y(v);
            g = g
                .add(line(MARGIN_LEFT - 5.0, y, MARGIN_LEFT, y, "black", 1.0))
                .add(text(MARGIN_LEFT - 8.0, y + 4.0, "end", 12.0, fmt_tick(v)));
            if grid && v > 0.0 {
                g = g.add(line(MARGIN_LEFT, y, WIDTH - MARGIN_RIGHT, y, "#cccccc", 0.5));
            }
            v += step;
        }

        let cx = 20.0;
        let cy = MARGIN_TOP + self.height() / 2.0;
        g.add(
            text(cx, cy, "middle", 14.0, y_label)
                .set("transform", format!("rotate(-90 {} {})", cx, cy)),
        )
    }

    /// Numeric ticks along the x axis.
    fn x_ticks(&self, x_label: &str, grid: bool) -> Group {
        let mut g = Group::new();
        let step = tick_step(self.x_max, 10.0);
        let mut v = 0.0;
        while v <= self.x_max + step / 2.0 {
            let x = self.x(v);
            g = g
                .add(line(x, self.bottom(), x, self.bottom() + 5.0, "black", 1.0))
                .add(text(x, self.bottom() + 20.0, "middle", 12.0, fmt_tick(v)));
            if grid && v > 0.0 {
                g = g.add(line(x, MARGIN_TOP, x, self.bottom(), "#cccccc", 0.5));
            }
            v += step;
        }
        g.add(text(
            MARGIN_LEFT + self.width() / 2.0,
            HEIGHT - 20.0,
            "middle",
            14.0,
            x_label,
        ))
    }
}

fn document() -> Document {
    Document::new()
        .set("width", WIDTH)
        .set("height", HEIGHT)
        .set("viewBox", format!("0 0 {} {}", WIDTH, HEIGHT))
        .add(
            Rectangle::new()
                .set("width", WIDTH)
                .set("height", HEIGHT)
                .set("fill", "white"),
        )
}

fn title(content: &str) -> Text {
    text(WIDTH / 2.0, MARGIN_TOP / 2.0 + 6.0, "middle", 16.0, content)
}

fn text(x: f32, y: f32, anchor: &str, size: f32, content: impl Into<String>) -> Text {
    Text::new()
        .set("x", x)
        .set("y", y)
        .set("text-anchor", anchor)
        .set("font-family", "sans-serif")
        .set("font-size", size)
        .add(TextNode::new(content))
}

fn line(x1: f32, y1: f32, x2: f32, y2: f32, color: &str, width: f32) -> Line {
    Line::new()
        .set("x1", x1)
        .set("y1", y1)
        .set("x2", x2)
        .set("y2", y2)
        .set("stroke", color)
        .set("stroke-width", width)
}

fn bar(x: f32, width: f32, top: f32, bottom: f32, color: &str) -> Rectangle {
    Rectangle::new()
        .set("x", x)
        .set("y", top)
        .set("width", width)
        .set("height", (bottom - top).max(0.0))
        .set("fill", color)
}

/// Smallest of 1, 2, 5 x 10^k that is at least `v / ticks`.
fn tick_step(v: f32, ticks: f32) -> f32 {
    let raw = (v / ticks).max(f32::EPSILON);
    let base = 10f32.powf(raw.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .map(|m| m * base)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * base)
}

/// Round an axis maximum up to a whole tick.
fn nice_ceiling(v: f32) -> f32 {
    if v <= 0.0 {
        return 1.0;
    }
    let step = tick_step(v, Y_TICKS);
    (v / step).ceil() * step
}

fn fmt_tick(v: f32) -> String {
    if v.fract().abs() < 1e-3 {
        format!("{}", v.round() as i64)
    } else {
        format!("{:.1}", v)
    }
}

fn runtime_or_zero(rt: &Option<i64>) -> f32 {
    rt.map(|v| v.max(0) as f32).unwrap_or(0.0)
}

/// One bar per stage for a single job, each labeled with its runtime.
pub fn job_bar_chart(row: &RuntimeRow, config: &RenderConfig) -> Document {
    let n = row.runtimes.len().max(1);
    let y_max = row.runtimes.iter().map(runtime_or_zero).fold(0.0, f32::max);
    let frame = Frame::new(n as f32, y_max);

    let slot = frame.width() / n as f32;
    let bar_width = slot * 0.7;
    let mut bars = Group::new();
    for (i, rt) in row.runtimes.iter().enumerate() {
        let v = runtime_or_zero(rt);
        let x = MARGIN_LEFT + slot * i as f32 + (slot - bar_width) / 2.0;
        let top = frame.y(v);
        bars = bars
            .add(bar(x, bar_width, top, frame.bottom(), config.color(0)))
            .add(text(x + bar_width / 2.0, top - 4.0, "middle", 12.0, fmt_tick(v)))
            .add(text(
                x + bar_width / 2.0,
                frame.bottom() + 20.0,
                "middle",
                12.0,
                config.stage_label(i),
            ));
    }

    document()
        .add(title(&format!("running time by each stages: {}", row.label)))
        .add(frame.axes("running time (sec)", false))
        .add(bars)
}

/// Stages along the x axis, one colored bar per job within each stage group.
pub fn grouped_bar_chart(rows: &[RuntimeRow], config: &RenderConfig) -> Document {
    let stages = rows
        .iter()
        .map(|r| r.runtimes.len())
        .max()
        .unwrap_or(0)
        .max(config.stage_count());
    let y_max = rows
        .iter()
        .flat_map(|r| r.runtimes.iter().map(runtime_or_zero))
        .fold(0.0, f32::max);
    let frame = Frame::new(stages as f32, y_max);

    let slot = frame.width() / stages as f32;
    let pad = slot * 0.15;
    let bar_width = (slot - 2.0 * pad) / rows.len().max(1) as f32;

    let mut bars = Group::new();
    for (j, row) in rows.iter().enumerate() {
        let color = config.color(j);
        for (i, rt) in row.runtimes.iter().enumerate() {
            let x = MARGIN_LEFT + slot * i as f32 + pad + bar_width * j as f32;
            bars = bars.add(bar(x, bar_width, frame.y(runtime_or_zero(rt)), frame.bottom(), color));
        }
    }

    let mut labels = Group::new();
    for i in 0..stages {
        labels = labels.add(text(
            MARGIN_LEFT + slot * (i as f32 + 0.5),
            frame.bottom() + 20.0,
            "middle",
            12.0,
            config.stage_label(i),
        ));
    }

    document()
        .add(title("running time by each stages"))
        .add(frame.axes("running time (sec)", false))
        .add(bars)
        .add(labels)
}

/// Active work units over time, with the client quota and the busy-client
/// band (count clipped to the quota) filled underneath.
///
/// `points` is an already resampled series.
pub fn workload_chart(points: &[LoadSample], config: &RenderConfig) -> Document {
    let quota = config.client_quota as f32;
    let x_max = points.last().map(|p| p.offset as f32).unwrap_or(0.0);
    let y_max = points
        .iter()
        .map(|p| p.count as f32)
        .fold(quota, f32::max);
    let frame = Frame::new(x_max, y_max);

    let mut g = Group::new();
    if let Some(first) = points.first() {
        let mut band = Data::new().move_to((frame.x(first.offset as f32), frame.bottom()));
        let mut count_line = Data::new().move_to((
            frame.x(first.offset as f32),
            frame.y(first.count as f32),
        ));
        for p in points {
            let busy = p.count.min(config.client_quota) as f32;
            band = band.line_to((frame.x(p.offset as f32), frame.y(busy)));
            count_line = count_line.line_to((frame.x(p.offset as f32), frame.y(p.count as f32)));
        }
        band = band
            .line_to((frame.x(x_max), frame.bottom()))
            .close();

        g = g
            .add(
                Path::new()
                    .set("d", band)
                    .set("fill", config.color(0))
                    .set("fill-opacity", 0.4)
                    .set("stroke", "none"),
            )
            .add(
                Path::new()
                    .set("d", count_line)
                    .set("fill", "none")
                    .set("stroke", config.color(0))
                    .set("stroke-width", 1.5),
            );
    }
    g = g.add(line(
        frame.x(0.0),
        frame.y(quota),
        frame.x(frame.x_max),
        frame.y(quota),
        config.color(1),
        1.0,
    ));

    document()
        .add(title("number of active workunits (queuing + running)"))
        .add(frame.axes("work units", true))
        .add(frame.x_ticks("time elapsed (sec)", true))
        .add(g)
}
