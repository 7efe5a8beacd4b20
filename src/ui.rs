use crate::config::DashboardContext;
use crate::model::ScanLogToday;
use crate::render::format_count;
use crate::status::StatusCounts;
use dioxus::core::NoOpMutations;
use dioxus::prelude::*;

const STYLES: &str = r#"
:root { color-scheme: light; }
* { box-sizing: border-box; }
body, html { margin: 0; padding: 0; background: #f4f5fa; }
.page { min-height: 100vh; display: flex; justify-content: center; padding: 28px 18px; color: #1d2233; font-family: "Inter", system-ui, -apple-system, sans-serif; }
.shell { width: min(1280px, 100%); display: flex; flex-direction: column; gap: 14px; }
.header { display: flex; flex-wrap: wrap; align-items: flex-end; justify-content: space-between; gap: 12px; }
.title { font-size: 24px; margin: 0; }
.subtitle { margin: 4px 0 0 0; color: #6b7288; font-size: 14px; }
.summary { display: flex; gap: 10px; flex-wrap: wrap; }
.summary-box { min-width: 92px; padding: 10px 14px; border-radius: 12px; background: #fff; border: 1px solid #e3e6ef; }
.summary-box strong { display: block; font-size: 20px; }
.summary-box span { font-size: 12px; color: #6b7288; }
.toolbar { display: flex; gap: 10px; flex-wrap: wrap; align-items: center; }
.search { flex: 1; min-width: 220px; padding: 10px 12px; border-radius: 10px; border: 1px solid #d5d9e6; font-size: 14px; }
.header-links { display: flex; gap: 8px; }
.pill-btn { padding: 9px 12px; border-radius: 10px; border: 1px solid #d5d9e6; background: #fff; font-weight: 600; cursor: pointer; }
.status { color: #6b7288; font-size: 13px; min-height: 18px; }
.error { color: #b42318; font-size: 13px; }
.filtered-out { display: none; }
.card-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(250px, 1fr)); gap: 12px; }
.machine-card { background: #fff; border: 1px solid #e3e6ef; border-radius: 14px; padding: 14px; cursor: pointer; display: flex; flex-direction: column; gap: 8px; box-shadow: 0 6px 18px rgba(25, 32, 56, 0.06); }
.card-head { display: flex; justify-content: space-between; align-items: center; }
.machine-no { font-weight: 700; font-size: 16px; color: inherit; text-decoration: none; }
.badge { display: inline-flex; align-items: center; padding: 2px 8px; border-radius: 999px; font-size: 11px; font-weight: 600; }
.badge.ready { background: #d1fae5; color: #065f46; }
.badge.active { background: #fef3c7; color: #92400e; }
.badge.done { background: #e0e7ff; color: #3730a3; }
.progress { height: 8px; border-radius: 999px; background: #eceef5; overflow: hidden; }
.progress-fill { height: 100%; border-radius: 999px; }
.progress-meta { display: flex; justify-content: space-between; font-size: 12px; }
.lot-summary { display: grid; grid-template-columns: auto 1fr; gap: 2px 10px; margin: 0; font-size: 12px; }
.lot-summary dt { color: #6b7288; }
.lot-summary dd { margin: 0; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
.machine-mini-chart { width: 100%; height: 48px; }
.muted { color: #6b7288; }
.caption { margin: 0; font-size: 12px; color: #6b7288; }
.log-table { width: 100%; border-collapse: collapse; background: #fff; border-radius: 12px; overflow: hidden; font-size: 13px; }
.log-table th, .log-table td { padding: 8px 10px; border-bottom: 1px solid #eceef5; text-align: left; }
.login-card { width: min(360px, 100%); margin: 60px auto; background: #fff; border: 1px solid #e3e6ef; border-radius: 14px; padding: 22px; display: flex; flex-direction: column; gap: 10px; }
.login-card input { padding: 10px 12px; border-radius: 10px; border: 1px solid #d5d9e6; }
.primary { padding: 11px 14px; border-radius: 10px; border: none; background: #4f46e5; color: #fff; font-weight: 700; cursor: pointer; }
@media (max-width: 640px) {
    .page { padding: 16px 10px; }
    .title { font-size: 20px; }
}
"#;

const DASHBOARD_SCRIPT: &str = r#"
(() => {
  const REFRESH_EVERY_MS = 30 * 1000;
  const search = document.getElementById('machine-search');
  const status = document.getElementById('refresh-status');
  const scanBtn = document.getElementById('test-scan-btn');
  const scanResult = document.getElementById('scan-result');

  function keyword() {
    return search ? search.value.trim().toLowerCase() : '';
  }

  function gridQuery() {
    const query = new URLSearchParams({ q: keyword() });
    const wanted = search ? search.dataset.status : '';
    if (wanted) query.set('status', wanted);
    return query.toString();
  }

  function applyFilter() {
    const kw = keyword();
    document.querySelectorAll('.card-slot').forEach((slot) => {
      const machineNo = (slot.dataset.machineNo || '').toLowerCase();
      const text = slot.innerText.toLowerCase();
      slot.classList.toggle('filtered-out', !(!kw || machineNo.includes(kw) || text.includes(kw)));
    });
  }

  function setCount(id, value) {
    const el = document.getElementById(id);
    if (el) el.textContent = value.toLocaleString();
  }

  async function refresh() {
    try {
      const [grid, data] = await Promise.all([
        fetch('/cards?' + gridQuery(), { cache: 'no-store' }),
        fetch('/api/machines', { cache: 'no-store' }),
      ]);
      if (!grid.ok || !data.ok) throw new Error('HTTP ' + grid.status + '/' + data.status);
      document.getElementById('card-grid').outerHTML = await grid.text();
      const body = await data.json();
      setCount('sumAllMachines', body.counts.all);
      setCount('sumReadyMachines', body.counts.ready);
      setCount('sumActiveMachines', body.counts.active);
      setCount('sumDoneMachines', body.counts.done);
      status.textContent = body.error ? body.error : 'Updated ' + new Date().toLocaleTimeString();
      applyFilter();
    } catch (err) {
      status.textContent = 'failed to load';
      console.error('refresh error:', err);
    }
  }

  document.addEventListener('click', (event) => {
    if (event.target.closest('a')) return;
    const card = event.target.closest('.machine-card');
    if (!card || !card.dataset.detailUrl) return;
    if (confirm(card.dataset.confirm || 'Open machine?')) {
      window.location.href = card.dataset.detailUrl;
    }
  });

  if (search) search.addEventListener('input', applyFilter);

  if (scanBtn) {
    scanBtn.addEventListener('click', async () => {
      const lot = prompt('Lot number:', 'LOT-AB-0001');
      if (!lot) return;
      scanResult.textContent = 'Sending: ' + lot;
      try {
        const res = await fetch('/api/scan', {
          method: 'POST',
          body: new URLSearchParams({ lot_no: lot, qty: '1', machine_no: 'MC-01' }),
        });
        const r = await res.json();
        scanResult.textContent = r.status === 'success'
          ? 'Recorded: ' + lot
          : 'Error: ' + (r.message || 'unknown error');
      } catch (err) {
        scanResult.textContent = 'Error: ' + err.message;
      }
    });
  }

  setInterval(refresh, REFRESH_EVERY_MS);
})();
"#;

const MACHINE_SCRIPT: &str = r#"
(() => {
  const REFRESH_EVERY_MS = 10 * 1000;
  const root = document.getElementById('scan-log');
  const body = document.getElementById('scan-log-body');
  const total = document.getElementById('scan-log-total');
  const status = document.getElementById('refresh-status');
  if (!root || !body) return;

  function cell(text) {
    const td = document.createElement('td');
    td.textContent = text === null || text === undefined || text === '' ? '-' : text;
    return td;
  }

  async function refresh() {
    try {
      const res = await fetch(root.dataset.logUrl, { cache: 'no-store' });
      if (!res.ok) throw new Error('HTTP ' + res.status);
      const state = await res.json();
      if (state.error) status.textContent = state.error;
      const log = state.log || { logs: [], total: 0 };
      body.replaceChildren(...log.logs.map((entry) => {
        const tr = document.createElement('tr');
        [entry.time, entry.lot_no, entry.part_no, entry.customer, (entry.qty || 0).toLocaleString()]
          .forEach((v) => tr.appendChild(cell(v)));
        return tr;
      }));
      total.textContent = (log.total || 0).toLocaleString();
      if (!state.error) status.textContent = 'Updated ' + new Date().toLocaleTimeString();
    } catch (err) {
      status.textContent = 'failed to load';
      console.error('scan log error:', err);
    }
  }

  setInterval(refresh, REFRESH_EVERY_MS);
})();
"#;

#[derive(Props, Clone, PartialEq)]
pub struct DashboardProps {
    pub context: DashboardContext,
    pub counts: StatusCounts,
    pub grid_html: String,
    pub keyword: String,
    pub status_filter: String,
    pub refreshed: Option<String>,
    pub error: Option<String>,
}

pub fn render_dashboard(props: DashboardProps) -> String {
    let mut app = VirtualDom::new_with_props(DashboardPage, props);
    // Build the tree before rendering to avoid SSR panics.
    let mut noop = NoOpMutations {};
    let _ = app.rebuild(&mut noop);
    dioxus_ssr::render(&mut app)
}

#[component]
fn DashboardPage(props: DashboardProps) -> Element {
    let department = props.context.department.clone();
    let view_type = props.context.view_type.clone();
    let all = format_count(props.counts.all as u64);
    let ready = format_count(props.counts.ready as u64);
    let active = format_count(props.counts.active as u64);
    let done = format_count(props.counts.done as u64);
    let status_line = match (&props.error, &props.refreshed) {
        (Some(err), _) => err.clone(),
        (None, Some(at)) => format!("Updated {at}"),
        (None, None) => "Waiting for first refresh".to_string(),
    };

    rsx! {
        div { class: "page",
            div { class: "shell",
                div { class: "header",
                    div {
                        h1 { class: "title", "Machine View" }
                        p { class: "subtitle", "Department: {department} · View: {view_type}" }
                    }
                    div { class: "summary",
                        div { class: "summary-box",
                            strong { id: "sumAllMachines", "{all}" }
                            span { "Machines" }
                        }
                        div { class: "summary-box",
                            strong { id: "sumReadyMachines", "{ready}" }
                            span { "Ready" }
                        }
                        div { class: "summary-box",
                            strong { id: "sumActiveMachines", "{active}" }
                            span { "Active" }
                        }
                        div { class: "summary-box",
                            strong { id: "sumDoneMachines", "{done}" }
                            span { "Done" }
                        }
                    }
                }
                div { class: "toolbar",
                    input {
                        id: "machine-search",
                        class: "search",
                        r#type: "search",
                        placeholder: "Search machine, lot, part or customer",
                        value: "{props.keyword}",
                        "data-status": "{props.status_filter}",
                    }
                    button { id: "test-scan-btn", class: "pill-btn", "Test scan" }
                    span { id: "scan-result", class: "status" }
                }
                div { id: "refresh-status", class: "status", "{status_line}" }
                div { dangerous_inner_html: "{props.grid_html}" }
            }
        }
        style { "{STYLES}" }
        script { "{DASHBOARD_SCRIPT}" }
    }
}

#[derive(Props, Clone, PartialEq)]
pub struct MachineProps {
    pub machine_no: String,
    pub back_url: String,
    pub lots_url: String,
    pub log_url: String,
    pub log: Option<ScanLogToday>,
    pub error: Option<String>,
}

pub fn render_machine(props: MachineProps) -> String {
    let mut app = VirtualDom::new_with_props(MachinePage, props);
    let mut noop = NoOpMutations {};
    let _ = app.rebuild(&mut noop);
    dioxus_ssr::render(&mut app)
}

#[component]
fn MachinePage(props: MachineProps) -> Element {
    let log = props.log.clone().unwrap_or_default();
    let total = format_count(log.total);
    let rows: Vec<[String; 5]> = log
        .logs
        .iter()
        .map(|entry| {
            let dash = |v: &Option<String>| v.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| "-".into());
            [
                dash(&entry.time),
                dash(&entry.lot_no),
                dash(&entry.part_no),
                dash(&entry.customer),
                format_count(entry.qty),
            ]
        })
        .collect();
    let status_line = props.error.clone().unwrap_or_default();

    rsx! {
        div { class: "page",
            div { class: "shell",
                div { class: "header",
                    div {
                        h1 { class: "title", "Machine {props.machine_no}" }
                        p { class: "subtitle", "Scans recorded today" }
                    }
                    div { class: "header-links",
                        a { class: "pill-btn", href: "{props.lots_url}", "Lot list" }
                        a { class: "pill-btn", href: "{props.back_url}", "Back to dashboard" }
                    }
                }
                div { id: "refresh-status", class: "status", "{status_line}" }
                div { id: "scan-log", "data-log-url": "{props.log_url}",
                    table { class: "log-table",
                        thead {
                            tr {
                                th { "Time" }
                                th { "Lot" }
                                th { "Part" }
                                th { "Customer" }
                                th { "Qty" }
                            }
                        }
                        tbody { id: "scan-log-body",
                            for row in rows {
                                tr {
                                    for value in row {
                                        td { "{value}" }
                                    }
                                }
                            }
                        }
                    }
                    p { class: "caption", "Total today: " span { id: "scan-log-total", "{total}" } }
                }
            }
        }
        style { "{STYLES}" }
        script { "{MACHINE_SCRIPT}" }
    }
}

#[derive(Props, Clone, PartialEq)]
pub struct LoginProps {
    pub user: String,
    pub error: Option<String>,
    pub welcome: Option<String>,
}

pub fn render_login(props: LoginProps) -> String {
    let mut app = VirtualDom::new_with_props(LoginPage, props);
    let mut noop = NoOpMutations {};
    let _ = app.rebuild(&mut noop);
    dioxus_ssr::render(&mut app)
}

#[component]
fn LoginPage(props: LoginProps) -> Element {
    rsx! {
        div { class: "page",
            form { class: "login-card", method: "post", action: "/login",
                h1 { class: "title", "Sign in" }
                if let Some(err) = props.error.clone() {
                    p { class: "error", "{err}" }
                }
                if let Some(msg) = props.welcome.clone() {
                    p { class: "status", "{msg}" }
                }
                input { name: "user", placeholder: "User", value: "{props.user}" }
                input { name: "password", r#type: "password", placeholder: "Password" }
                button { id: "login-btn", class: "primary", r#type: "submit", "Sign in" }
                a { class: "caption", href: "/", "Go to dashboard" }
            }
        }
        style { "{STYLES}" }
    }
}
