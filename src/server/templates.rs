//! HTML templates for the dashboard.

use crate::dashboard::{format_count, Dashboard, DashboardFilter, WINDOWS};
use crate::utils::html_escape;

/// Base HTML page.
pub fn base_template(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - ytpipe</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <header id="main-header">
        <nav>
            <a href="/" class="logo">ytpipe</a>
            <a href="/api/dashboard">json</a>
        </nav>
    </header>
    <main>
        <h1>{title}</h1>
        {content}
    </main>
</body>
</html>"#,
        title = html_escape(title),
        content = content
    )
}

pub fn error_page(message: &str) -> String {
    base_template(
        "Error",
        &format!(r#"<p class="error">{}</p>"#, html_escape(message)),
    )
}

fn filter_form(dash: &Dashboard) -> String {
    let windows: String = WINDOWS
        .iter()
        .map(|n| {
            let selected = if *n == dash.filter.ndays { " selected" } else { "" };
            format!(r#"<option value="{n}"{selected}>Last {n} days</option>"#)
        })
        .collect();

    let mut channels = String::from(r#"<option value="">All channels</option>"#);
    for ch in &dash.channels {
        let selected = if dash.filter.channel_id.as_deref() == Some(ch.channel_id.as_str()) {
            " selected"
        } else {
            ""
        };
        channels.push_str(&format!(
            r#"<option value="{}"{}>{}</option>"#,
            html_escape(&ch.channel_id),
            selected,
            html_escape(&ch.channel_title)
        ));
    }

    format!(
        r#"
    <form class="filters" method="get" action="/dashboard">
        <select name="ndays">{windows}</select>
        <select name="channel_id">{channels}</select>
        <button type="submit">apply</button>
    </form>"#
    )
}

fn kpi_cards(dash: &Dashboard) -> String {
    let engagement = dash
        .engagement_per_1k
        .map(|e| format!("{:.2}", e))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        r#"
    <section class="kpis">
        <div class="kpi"><span class="label">Views</span><span class="value">{}</span></div>
        <div class="kpi"><span class="label">Likes</span><span class="value">{}</span></div>
        <div class="kpi"><span class="label">Comments</span><span class="value">{}</span></div>
        <div class="kpi"><span class="label">Engagement / 1k views</span><span class="value">{}</span></div>
    </section>"#,
        format_count(dash.kpis.views),
        format_count(dash.kpis.likes),
        format_count(dash.kpis.comments),
        engagement
    )
}

/// Width of a CSS bar relative to the largest value.
fn bar_width(value: i64, max: i64) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    (value.max(0) as f64 / max as f64 * 100.0).clamp(0.0, 100.0)
}

fn bar_rows<'a>(rows: impl Iterator<Item = (&'a str, i64)> + Clone) -> String {
    let max = rows.clone().map(|(_, v)| v).max().unwrap_or(0);
    rows.map(|(label, value)| {
        format!(
            r#"
            <tr>
                <td>{}</td>
                <td class="bar-cell"><div class="bar" style="width: {:.1}%"></div></td>
                <td class="num">{}</td>
            </tr>"#,
            html_escape(label),
            bar_width(value, max),
            format_count(value)
        )
    })
    .collect()
}

fn empty_note(what: &str) -> String {
    format!(r#"<p class="empty">No {} for this selection.</p>"#, what)
}

fn daily_section(dash: &Dashboard) -> String {
    if dash.daily.is_empty() {
        return empty_note("daily statistics");
    }
    format!(
        r#"<table class="bars"><thead><tr><th>Date</th><th></th><th>Views</th></tr></thead>
        <tbody>{}</tbody></table>"#,
        bar_rows(dash.daily.iter().map(|d| (d.date.as_str(), d.views)))
    )
}

fn channel_section(dash: &Dashboard) -> String {
    if dash.top_channels.is_empty() {
        return empty_note("channels");
    }
    format!(
        r#"<table class="bars"><thead><tr><th>Channel</th><th></th><th>Views</th></tr></thead>
        <tbody>{}</tbody></table>"#,
        bar_rows(
            dash.top_channels
                .iter()
                .map(|c| (c.channel_title.as_str(), c.views))
        )
    )
}

fn video_section(dash: &Dashboard) -> String {
    if dash.top_videos.is_empty() {
        return empty_note("videos");
    }
    let rows: String = dash
        .top_videos
        .iter()
        .map(|v| {
            let published = v
                .published_at
                .as_deref()
                .map(|p| p.get(..10).unwrap_or(p))
                .unwrap_or("");
            format!(
                r#"
            <tr>
                <td><a href="https://www.youtube.com/watch?v={id}">{title}</a></td>
                <td>{channel}</td>
                <td>{published}</td>
                <td class="num">{views}</td>
                <td class="num">{likes}</td>
                <td class="num">{comments}</td>
            </tr>"#,
                id = html_escape(&v.video_id),
                title = html_escape(v.title.as_deref().unwrap_or(&v.video_id)),
                channel = html_escape(v.channel_title.as_deref().unwrap_or("")),
                published = html_escape(published),
                views = format_count(v.views),
                likes = format_count(v.likes),
                comments = format_count(v.comments),
            )
        })
        .collect();

    format!(
        r#"
    <table class="listing">
        <thead>
            <tr>
                <th>Video</th>
                <th>Channel</th>
                <th>Published</th>
                <th>Views</th>
                <th>Likes</th>
                <th>Comments</th>
            </tr>
        </thead>
        <tbody>{}</tbody>
    </table>"#,
        rows
    )
}

fn freshness_line(dash: &Dashboard) -> String {
    match &dash.freshness {
        Some(f) => format!(
            r#"<p class="freshness">Latest snapshot: {} ({} rows)</p>"#,
            html_escape(&f.latest_date),
            format_count(f.row_count)
        ),
        None => r#"<p class="freshness">No statistics loaded yet.</p>"#.to_string(),
    }
}

/// Render the dashboard page.
pub fn dashboard_page(dash: &Dashboard) -> String {
    let content = format!(
        r#"
    {form}
    {freshness}
    <p class="window">Since {since}</p>
    {kpis}
    <h2>Daily views</h2>
    {daily}
    <h2>Top channels</h2>
    {channels}
    <h2>Top videos</h2>
    {videos}"#,
        form = filter_form(dash),
        freshness = freshness_line(dash),
        since = dash.since.format("%Y-%m-%d"),
        kpis = kpi_cards(dash),
        daily = daily_section(dash),
        channels = channel_section(dash),
        videos = video_section(dash),
    );
    base_template(&page_title(&dash.filter), &content)
}

fn page_title(filter: &DashboardFilter) -> String {
    format!("YouTube analytics, last {} days", filter.ndays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{ChannelOption, Kpis, TopVideo};
    use chrono::NaiveDate;

    fn dashboard() -> Dashboard {
        Dashboard {
            filter: DashboardFilter {
                ndays: 7,
                channel_id: Some("c1".into()),
            },
            since: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
            channels: vec![ChannelOption {
                channel_id: "c1".into(),
                channel_title: "Alpha & Co".into(),
            }],
            kpis: Kpis {
                views: 1_234_567,
                likes: 10,
                comments: 2,
            },
            daily: Vec::new(),
            top_videos: vec![TopVideo {
                video_id: "abc".into(),
                title: Some("<Intro>".into()),
                channel_title: None,
                published_at: Some("2025-03-01T00:00:00+00:00".into()),
                views: 5,
                likes: 1,
                comments: 0,
            }],
            engagement_per_1k: Some(9.72),
            top_channels: Vec::new(),
            freshness: None,
        }
    }

    #[test]
    fn test_dashboard_page() {
        let html = dashboard_page(&dashboard());
        assert!(html.contains("1,234,567"));
        assert!(html.contains("9.72"));
        assert!(html.contains("Alpha &amp; Co"));
        assert!(html.contains("&lt;Intro&gt;"));
        assert!(html.contains(r#"<option value="c1" selected>"#));
        assert!(html.contains(r#"<option value="7" selected>"#));
        assert!(html.contains("No daily statistics"));
        assert!(html.contains("2025-03-01</td>"));
    }

    #[test]
    fn test_bar_width() {
        assert_eq!(bar_width(50, 100), 50.0);
        assert_eq!(bar_width(5, 0), 0.0);
        assert_eq!(bar_width(-3, 10), 0.0);
    }
}
