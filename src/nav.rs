use crate::config::DashboardContext;
use url::Url;
use url::form_urlencoded::Serializer;

const DEFAULT_DEPARTMENT: &str = "Overall";

/// Backend drill-down list filtered to one machine.
pub fn machine_list_url(base: &str, machine_no: &str, department: Option<&str>, ctx: &DashboardContext) -> String {
    let query = Serializer::new(String::new())
        .append_pair("department", pick_department(department, ctx))
        .append_pair("view", "list")
        .append_pair("machine_no", machine_no)
        .finish();
    format!("{}/dashboard/?{query}", base.trim_end_matches('/'))
}

/// Backend page for one machine's lots.
pub fn machine_detail_url(base: &str, machine_no: &str, department: Option<&str>, ctx: &DashboardContext) -> String {
    let query = Serializer::new(String::new())
        .append_pair("department", pick_department(department, ctx))
        .finish();
    format!(
        "{}/dashboard/machine/{}/?{query}",
        base.trim_end_matches('/'),
        encode_segment(machine_no)
    )
}

/// Local page with the machine's scans for today.
pub fn machine_page_path(machine_no: &str) -> String {
    format!("/machine/{}", encode_segment(machine_no))
}

pub fn scan_log_route(machine_no: &str) -> String {
    format!("/api/machine/{}/scan-log", encode_segment(machine_no))
}

/// Local dashboard with the search box preset to one machine.
pub fn dashboard_search_path(machine_no: &str) -> String {
    let query = Serializer::new(String::new()).append_pair("q", machine_no).finish();
    format!("/?{query}")
}

pub fn scan_logs_today_path(machine_no: &str) -> String {
    format!("/api/machine/{}/scan_logs_today/", encode_segment(machine_no))
}

/// Prompt shown before leaving the dashboard for a machine's lot list.
pub fn confirm_prompt(machine_no: &str) -> String {
    format!("View work for machine {machine_no}?")
}

/// Percent-encodes one path segment, including `/`.
pub fn encode_segment(segment: &str) -> String {
    let Ok(mut scratch) = Url::parse("http://segment.invalid/") else {
        return segment.to_string();
    };
    if let Ok(mut segments) = scratch.path_segments_mut() {
        segments.clear().push(segment);
    }
    scratch.path().trim_start_matches('/').to_string()
}

fn pick_department<'a>(explicit: Option<&'a str>, ctx: &'a DashboardContext) -> &'a str {
    [explicit.unwrap_or_default(), ctx.department.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DEPARTMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(department: &str) -> DashboardContext {
        DashboardContext {
            department: department.to_string(),
            view_type: "machine".to_string(),
        }
    }

    #[test]
    fn list_url_uses_context_department() {
        assert_eq!(
            machine_list_url("http://backend.test", "MC-01", None, &ctx("Preform")),
            "http://backend.test/dashboard/?department=Preform&view=list&machine_no=MC-01"
        );
    }

    #[test]
    fn list_url_falls_back_to_overall() {
        assert_eq!(
            machine_list_url("http://backend.test/", "MC 7", Some(""), &ctx("")),
            "http://backend.test/dashboard/?department=Overall&view=list&machine_no=MC+7"
        );
    }

    #[test]
    fn detail_url_encodes_segment() {
        assert_eq!(
            machine_detail_url("http://backend.test", "A/B 1", Some("Assembly"), &ctx("Preform")),
            "http://backend.test/dashboard/machine/A%2FB%201/?department=Assembly"
        );
    }

    #[test]
    fn local_paths_encode_machine() {
        assert_eq!(machine_page_path("MC 01"), "/machine/MC%2001");
        assert_eq!(scan_log_route("MC-01"), "/api/machine/MC-01/scan-log");
        assert_eq!(dashboard_search_path("MC 01"), "/?q=MC+01");
    }

    #[test]
    fn scan_log_path() {
        assert_eq!(scan_logs_today_path("MC-01"), "/api/machine/MC-01/scan_logs_today/");
    }
}
