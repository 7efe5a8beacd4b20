use crate::charts::MiniChart;
use crate::config::AppConfig;
use crate::model::{CardSummary, MachineAggregate, Status};
use crate::nav;
use chrono::{DateTime, FixedOffset, Utc};
use dioxus::core::NoOpMutations;
use dioxus::prelude::*;
use serde::Serialize;

const CHART_BAR_PITCH: usize = 10;
const CHART_HEIGHT: f64 = 40.0;

/// Everything one machine card shows, already resolved to display values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CardView {
    pub machine_no: String,
    pub status: Status,
    pub percent: u8,
    pub hue: u16,
    pub total_target: u64,
    pub total_scanned: u64,
    pub lot_count: usize,
    pub lot_no: Option<String>,
    pub part_no: Option<String>,
    pub customer: Option<String>,
    pub lot_target: u64,
    pub lot_produced: u64,
    pub production_quantity: u64,
    pub pieces_per_box: u64,
    pub boxes: u64,
    pub last_scan_display: Option<String>,
    pub chart: Option<MiniChart>,
    pub summary_url: Option<String>,
    pub page_url: String,
    pub list_url: String,
    pub detail_url: String,
    pub confirm_prompt: String,
}

/// A card after rendering: markup plus the text a reader would see in it.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedCard {
    pub machine_no: String,
    pub status: Status,
    pub text: String,
    pub markup: String,
    pub visible: bool,
}

pub fn card_view(
    aggregate: &MachineAggregate,
    status: Status,
    chart: Option<&MiniChart>,
    summary: Option<&CardSummary>,
    config: &AppConfig,
) -> CardView {
    let percent = aggregate.percent_complete();
    let first = aggregate.first_lot();
    let last_scan_display = aggregate
        .last_scan
        .map(|ts| format_timestamp(ts, config.display_offset))
        .or_else(|| summary.and_then(|s| s.last_scan_display.clone()))
        .filter(|s| !s.trim().is_empty());
    CardView {
        machine_no: aggregate.machine_no.clone(),
        status,
        percent,
        hue: progress_hue(percent),
        total_target: aggregate.total_target,
        total_scanned: aggregate.total_scanned,
        lot_count: aggregate.lots.len(),
        lot_no: first.map(|lot| lot.lot_no.clone()),
        part_no: first.and_then(|lot| lot.part_no.clone()),
        customer: first.and_then(|lot| lot.customer.clone()),
        lot_target: first.map(|lot| lot.target).unwrap_or_default(),
        lot_produced: first.map(|lot| lot.scanned_count).unwrap_or_default(),
        production_quantity: first.map(|lot| lot.production_quantity).unwrap_or_default(),
        pieces_per_box: first.map(|lot| lot.pieces_per_box).unwrap_or_default(),
        boxes: first.map(|lot| lot.full_boxes()).unwrap_or_default(),
        last_scan_display,
        chart: chart.cloned(),
        summary_url: config.summary_url(&aggregate.machine_no),
        page_url: nav::machine_page_path(&aggregate.machine_no),
        list_url: nav::machine_list_url(&config.backend_url, &aggregate.machine_no, None, &config.context),
        detail_url: nav::machine_detail_url(&config.backend_url, &aggregate.machine_no, None, &config.context),
        confirm_prompt: nav::confirm_prompt(&aggregate.machine_no),
    }
}

/// HSL hue for a progress fill: 0 is red, 120 is green.
pub fn progress_hue(percent: u8) -> u16 {
    (f64::from(percent.min(100)) / 100.0 * 120.0).round() as u16
}

pub fn format_timestamp(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%d/%m/%Y %H:%M").to_string()
}

/// `12345` -> `12,345`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value >= 0.0 {
        format_count(value as u64)
    } else {
        format!("{value:.1}")
    }
}

fn text_or_dash(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".to_string(),
    }
}

pub fn render_card(view: &CardView) -> RenderedCard {
    let mut dom = VirtualDom::new_with_props(MachineCard, CardProps { view: view.clone() });
    let mut noop = NoOpMutations {};
    let _ = dom.rebuild(&mut noop);
    RenderedCard {
        machine_no: view.machine_no.clone(),
        status: view.status,
        text: searchable_text(view),
        markup: dioxus_ssr::render(&mut dom),
        visible: true,
    }
}

fn searchable_text(view: &CardView) -> String {
    [
        view.machine_no.clone(),
        view.status.label().to_string(),
        text_or_dash(&view.lot_no),
        text_or_dash(&view.part_no),
        text_or_dash(&view.customer),
        format_count(view.lot_target),
        format_count(view.lot_produced),
        text_or_dash(&view.last_scan_display),
    ]
    .join(" ")
}

#[derive(Props, Clone, PartialEq)]
pub struct CardProps {
    pub view: CardView,
}

#[component]
fn MachineCard(props: CardProps) -> Element {
    let view = &props.view;
    let status_class = view.status.badge_class();
    let status_label = view.status.label();
    let fill_style = format!("width: {}%; background: hsl({}, 70%, 45%);", view.percent, view.hue);
    let summary_url = view.summary_url.clone().unwrap_or_default();
    let lot_no = text_or_dash(&view.lot_no);
    let part_no = text_or_dash(&view.part_no);
    let customer = text_or_dash(&view.customer);
    let customer_title = view.customer.clone().unwrap_or_default();
    let target = format_count(view.lot_target);
    let produced = format_count(view.lot_produced);
    let quantity = format_count(view.production_quantity);
    let per_box = format_count(view.pieces_per_box);
    let boxes = format_count(view.boxes);
    let totals = format!("{} / {}", format_count(view.total_scanned), format_count(view.total_target));
    let last_scan = text_or_dash(&view.last_scan_display);
    let extra_lots = view.lot_count.saturating_sub(1);

    rsx! {
        div {
            class: "machine-card",
            "data-machine-no": "{view.machine_no}",
            "data-summary-url": "{summary_url}",
            "data-detail-url": "{view.list_url}",
            "data-confirm": "{view.confirm_prompt}",
            div { class: "card-head",
                a { class: "machine-no", href: "{view.page_url}", "{view.machine_no}" }
                span { class: "{status_class} js-status-badge", "{status_label}" }
            }
            div { class: "progress",
                div { class: "progress-fill", style: "{fill_style}" }
            }
            div { class: "progress-meta",
                span { "{view.percent}%" }
                span { class: "muted", "{totals}" }
            }
            dl { class: "lot-summary",
                dt { "Lot" }
                dd { class: "js-lot-no", "{lot_no}" }
                dt { "Part" }
                dd { class: "js-part-no", "{part_no}" }
                dt { "Customer" }
                dd { class: "js-customer", title: "{customer_title}", "{customer}" }
                dt { "Target" }
                dd { class: "js-target", "{target}" }
                dt { "Produced" }
                dd { class: "js-produced", "{produced}" }
                dt { "Order qty" }
                dd { "{quantity}" }
                dt { "Boxes" }
                dd { "{boxes} × {per_box}" }
                dt { "Last scan" }
                dd { class: "js-last-scan", "{last_scan}" }
            }
            if extra_lots > 0 {
                p { class: "caption", "+{extra_lots} more lots on this machine" }
            }
            a { class: "caption backend-link", href: "{view.detail_url}", "Lot details" }
            if let Some(chart) = view.chart.clone() {
                MiniBarChart { chart: chart }
            }
        }
    }
}

#[component]
fn MiniBarChart(chart: MiniChart) -> Element {
    let peak = chart.peak();
    let width = chart.labels.len().min(chart.daily.len()) * CHART_BAR_PITCH;
    let view_box = format!("0 0 {} {}", width.max(CHART_BAR_PITCH), CHART_HEIGHT);
    let bars: Vec<(usize, String, String, String)> = chart
        .bars()
        .enumerate()
        .map(|(i, (label, value))| {
            let height = if peak > 0.0 { value.max(0.0) / peak * (CHART_HEIGHT - 2.0) } else { 0.0 };
            (
                i * CHART_BAR_PITCH + 1,
                format!("{:.2}", CHART_HEIGHT - height),
                format!("{height:.2}"),
                format!("{label}: {} pcs", format_quantity(value)),
            )
        })
        .collect();

    rsx! {
        svg {
            class: "machine-mini-chart",
            "data-chart-key": "{chart.machine_no}",
            "data-revision": "{chart.revision}",
            "viewBox": "{view_box}",
            "preserveAspectRatio": "none",
            for (x, y, height, tip) in bars {
                rect {
                    "x": "{x}",
                    "y": "{y}",
                    "width": "8",
                    "height": "{height}",
                    "fill": "rgba(129, 140, 248, 0.85)",
                    title { "{tip}" }
                }
            }
        }
    }
}

#[derive(Props, Clone, PartialEq)]
pub struct GridProps {
    pub cards: Vec<RenderedCard>,
}

/// Card grid fragment; hidden cards stay in the markup so the page can re-show them.
pub fn render_grid(cards: &[RenderedCard]) -> String {
    let mut dom = VirtualDom::new_with_props(CardGrid, GridProps { cards: cards.to_vec() });
    let mut noop = NoOpMutations {};
    let _ = dom.rebuild(&mut noop);
    dioxus_ssr::render(&mut dom)
}

#[component]
fn CardGrid(props: GridProps) -> Element {
    let slots: Vec<(String, &'static str, String)> = props
        .cards
        .iter()
        .map(|card| {
            let class = if card.visible { "card-slot" } else { "card-slot filtered-out" };
            (card.machine_no.clone(), class, card.markup.clone())
        })
        .collect();

    rsx! {
        div { id: "card-grid", class: "card-grid",
            if slots.is_empty() {
                p { class: "muted", "No machines to show." }
            }
            for (machine_no, class, markup) in slots {
                div {
                    key: "{machine_no}",
                    class: "{class}",
                    "data-machine-no": "{machine_no}",
                    dangerous_inner_html: "{markup}",
                }
            }
        }
    }
}
