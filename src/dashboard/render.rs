//! Server-side HTML for the dashboard and the per-domain log viewer.

use crate::dashboard::ui::{FlashLevel, SortDirection, SortKey, Theme};
use crate::dashboard::view::{Dashboard, DomainRow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use quick_xml::escape::escape;
use std::fmt::Write;

const STYLE: &str = "\
body{font-family:sans-serif;margin:2em;background:#fff;color:#222}\
body.dark{background:#1e1e1e;color:#ddd}\
table{border-collapse:collapse;width:100%}\
th,td{padding:.4em .6em;border-bottom:1px solid #8884;text-align:left}\
.flash{padding:.5em;margin:.3em 0;border-radius:4px}\
.info{background:#d9edf7}.success{background:#dff0d8}.warning{background:#fcf8e3}.danger{background:#f2dede}\
.dark .flash{color:#222}\
.menu{display:inline-block;border:1px solid #8888;padding:.5em}\
form.inline{display:inline}\
pre{white-space:pre-wrap}";

const COLUMNS: [(SortKey, &str, &str); 4] = [
    (SortKey::Domain, "domain", "Domain"),
    (SortKey::Ip, "ip", "Recorded IP"),
    (SortKey::Updated, "updated", "Last Checked"),
    (SortKey::Expiration, "expiration", "SSL Expires"),
];

fn time(at: Option<DateTime<Utc>>, tz: Tz) -> String {
    at.map_or_else(
        || "N/A".to_string(),
        |at| at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
    )
}

fn level_class(level: FlashLevel) -> &'static str {
    match level {
        FlashLevel::Info => "info",
        FlashLevel::Success => "success",
        FlashLevel::Warning => "warning",
        FlashLevel::Danger => "danger",
    }
}

fn page(title: &str, theme: Theme, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\" data-theme=\"{theme}\">\n<head><meta charset=\"utf-8\">\
         <title>{title}</title><style>{STYLE}</style></head>\n<body class=\"{theme}\">\n{body}</body>\n</html>\n",
        theme = theme.as_str(),
        title = escape(title),
    )
}

fn post_button(action: &str, label: &str) -> String {
    format!(
        "<form class=\"inline\" method=\"post\" action=\"{}\"><button type=\"submit\">{}</button></form>",
        escape(action),
        escape(label)
    )
}

fn domain_row(out: &mut String, row: &DomainRow, tz: Tz) {
    let name = escape(row.name.as_str());
    let path = urlencoding::encode(&row.name);
    let _ = write!(
        out,
        "<tr class=\"domain-row\"><td><a href=\"/ui/expand/{path}\">{marker} {name}</a></td>\
         <td>{ip}</td><td>{updated}</td><td>{cert}</td><td>",
        marker = if row.expanded { "&#9662;" } else { "&#9656;" },
        ip = escape(row.recorded_ip.as_deref().unwrap_or("N/A")),
        updated = time(row.last_update, tz),
        cert = row.cert.label(),
    );
    if row.ddns {
        let _ = write!(out, "<a href=\"/api/refresh_ip/{path}\">Refresh IP</a> ");
        out.push_str(&post_button(&format!("/api/force_update_ip/{path}"), "Force Update"));
    }
    if row.ssl {
        out.push_str(&post_button(&format!("/api/trigger/ssl_create/{path}"), "Create Certificate"));
    }
    let _ = writeln!(out, " <a href=\"/logs/{path}\">Logs</a></td></tr>");

    if row.expanded {
        let flag = |on: bool| if on { "yes" } else { "no" };
        let _ = writeln!(
            out,
            "<tr class=\"detail-row\"><td colspan=\"5\">DDNS: {} &middot; Auto-update: {} &middot; \
             SSL: {} &middot; Wildcard: {} &middot; Notifications: {} &middot; Last renewal: {}</td></tr>",
            flag(row.ddns),
            flag(row.auto_update),
            flag(row.ssl),
            flag(row.wildcard),
            flag(row.notifications),
            time(row.ssl_last_renew, tz),
        );
    }
}

/// The main dashboard page.
pub fn dashboard(view: &Dashboard, tz: Tz) -> String {
    let mut body = String::new();
    if view.demo {
        body.push_str("<p class=\"flash warning\">DEMO MODE: no real DNS records or certificates are changed.</p>\n");
    }
    body.push_str("<h1>Domain Manager</h1>\n");
    for flash in &view.flashes {
        let _ = writeln!(
            body,
            "<div class=\"flash {}\">{}</div>",
            level_class(flash.level),
            escape(flash.message.as_str())
        );
    }

    let _ = writeln!(
        body,
        "<p>Public IP: <strong>{}</strong> &middot; Last check: {} &middot; Next DDNS check: {} \
         &middot; Next SSL check: {} &middot; Timezone: {}</p>",
        escape(view.public_ip.as_str()),
        time(view.last_ip_check, tz),
        escape(view.next_ddns_run.as_str()),
        escape(view.next_ssl_run.as_str()),
        escape(view.timezone.as_str()),
    );

    let theme_label = match view.theme {
        Theme::Light => "Dark mode",
        Theme::Dark => "Light mode",
    };
    body.push_str(&post_button("/ui/theme", theme_label));
    body.push_str(" <a href=\"/ui/menu/toggle\">Bulk actions</a>\n");
    if view.menu_open {
        body.push_str("<div class=\"menu\">");
        body.push_str(&post_button("/api/trigger/ddns", "Run DDNS check"));
        body.push_str(&post_button("/api/trigger/ssl_renew", "Run SSL renewal check"));
        body.push_str(&post_button("/api/trigger/test_notification", "Send test notification"));
        body.push_str(" <a href=\"/ui/menu/inside\">&#8942;</a> <a href=\"/ui/menu/outside\">Close</a></div>\n");
    }

    body.push_str("<table>\n<tr>");
    for (key, path, label) in COLUMNS {
        let arrow = match view.sort {
            Some(sort) if sort.key == key => match sort.direction {
                SortDirection::Asc => " &#9650;",
                SortDirection::Desc => " &#9660;",
            },
            _ => "",
        };
        let _ = write!(body, "<th><a href=\"/ui/sort/{path}\">{label}{arrow}</a></th>");
    }
    body.push_str("<th>Actions</th></tr>\n");
    for row in &view.domains {
        domain_row(&mut body, row, tz);
    }
    body.push_str("</table>\n");
    if view.domains.is_empty() {
        body.push_str("<p>No domains configured. Use <code>PUT /api/settings</code> to add some.</p>\n");
    }

    page("Domain Manager", view.theme, &body)
}

/// The log viewer for one domain.
pub fn domain_log(domain: &str, content: &str, theme: Theme) -> String {
    let body = format!(
        "<h1>Logs for {domain}</h1>\n<p><a href=\"/\">Back to dashboard</a></p>\n<pre>{content}</pre>\n",
        domain = escape(domain),
        content = escape(content),
    );
    page(&format!("Logs for {domain}"), theme, &body)
}
