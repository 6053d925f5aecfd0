use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::types::{PlayerPage, YearlyPerformanceRecord};
use crate::utils::{css, trimmed_text};

const IMAGES_DIR: &str = "images";
const INDEX_FILE: &str = "index.html";
const CHART_JS_URL: &str = "https://cdn.jsdelivr.net/npm/chart.js";

static CLUE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^clue-(\d{4}-\d{2}-\d{2})\.jpg$").expect("valid clue pattern"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9-]*)\b[^>]*>").expect("valid tag pattern")
});
static CLASSED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([a-zA-Z][a-zA-Z0-9-]*)\b[^>]*?\sclass\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#)
        .expect("valid class pattern")
});

/// Bar colours (rgb) and short names for franchise abbreviations used by
/// Baseball-Reference, including a few historical ones.
const TEAM_COLORS: &[(&str, (u8, u8, u8), &str)] = &[
    ("ARI", (167, 25, 48), "D-backs"),
    ("ATL", (20, 44, 86), "Braves"),
    ("BAL", (223, 70, 1), "Orioles"),
    ("BOS", (12, 35, 64), "Red Sox"),
    ("CHC", (14, 51, 134), "Cubs"),
    ("CHW", (39, 37, 31), "White Sox"),
    ("CIN", (198, 12, 48), "Reds"),
    ("CLE", (12, 35, 64), "Guardians"),
    ("COL", (51, 0, 111), "Rockies"),
    ("DET", (12, 35, 64), "Tigers"),
    ("HOU", (0, 45, 98), "Astros"),
    ("KCR", (0, 70, 135), "Royals"),
    ("LAA", (186, 0, 33), "Angels"),
    ("LAD", (0, 90, 156), "Dodgers"),
    ("MIA", (0, 142, 204), "Marlins"),
    ("MIL", (12, 35, 64), "Brewers"),
    ("MIN", (12, 35, 64), "Twins"),
    ("NYM", (0, 45, 114), "Mets"),
    ("NYY", (12, 35, 64), "Yankees"),
    ("OAK", (0, 56, 49), "Athletics"),
    ("PHI", (232, 24, 40), "Phillies"),
    ("PIT", (253, 184, 39), "Pirates"),
    ("SDP", (79, 64, 51), "Padres"),
    ("SFG", (253, 90, 30), "Giants"),
    ("SEA", (12, 35, 64), "Mariners"),
    ("STL", (196, 30, 58), "Cardinals"),
    ("TBR", (143, 188, 230), "Rays"),
    ("TEX", (0, 50, 120), "Rangers"),
    ("TOR", (20, 54, 136), "Blue Jays"),
    ("WSN", (171, 0, 3), "Nationals"),
    ("MON", (0, 45, 114), "Expos"),
    ("CAL", (186, 0, 33), "Angels"),
    ("FLA", (0, 142, 204), "Marlins"),
    ("BRO", (0, 90, 156), "Dodgers"),
    ("SLB", (139, 69, 19), "Browns"),
    ("2TM", (107, 114, 128), "Multiple"),
    ("3TM", (107, 114, 128), "Multiple"),
    ("Total", (107, 114, 128), "Career"),
    ("Default", (156, 163, 175), "Other"),
];

/// Extra words the index search box should match for each franchise
const TEAM_SEARCH_NAMES: &[(&str, &str)] = &[
    ("NYY", "new york yankees"),
    ("BOS", "boston red sox"),
    ("CAL", "california angels"),
    ("CHW", "chicago white sox"),
    ("OAK", "oakland athletics"),
    ("PHI", "philadelphia phillies"),
    ("SDP", "san diego padres"),
    ("LAD", "los angeles dodgers"),
    ("CHC", "chicago cubs"),
    ("NYM", "new york mets"),
    ("CIN", "cincinnati reds"),
    ("ATL", "atlanta braves"),
    ("CLE", "cleveland indians guardians"),
    ("SEA", "seattle mariners"),
    ("TOR", "toronto blue jays"),
    ("TEX", "texas rangers"),
    ("KCR", "kansas city royals"),
    ("MIN", "minnesota twins"),
    ("DET", "detroit tigers"),
    ("BAL", "baltimore orioles"),
    ("TBR", "tampa bay rays devil"),
    ("HOU", "houston astros"),
    ("LAA", "los angeles angels"),
    ("SFG", "san francisco giants"),
    ("ARI", "arizona diamondbacks"),
    ("COL", "colorado rockies"),
    ("MIL", "milwaukee brewers"),
    ("STL", "st louis cardinals"),
    ("PIT", "pittsburgh pirates"),
    ("MIA", "miami florida marlins"),
    ("WSN", "washington nationals"),
    ("MON", "montreal expos"),
];

/// Hidden block on every detail page that the index reads back for search
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct SearchData {
    #[serde(default)]
    teams: Vec<String>,
    #[serde(default)]
    years: Vec<String>,
}

impl SearchData {
    fn from_yearly(yearly: &[YearlyPerformanceRecord]) -> Self {
        let mut data = SearchData::default();
        for record in yearly {
            for team in &record.teams {
                if !data.teams.contains(team) {
                    data.teams.push(team.clone());
                }
            }
            if !data.years.contains(&record.year) {
                data.years.push(record.year.clone());
            }
        }
        data
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// JSON that is safe to drop inside a `<script>` element
fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

/// "May 01, 2024"
pub fn long_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

pub fn clue_image_path(project_dir: &Path, date: NaiveDate) -> PathBuf {
    project_dir
        .join(IMAGES_DIR)
        .join(format!("clue-{}.jpg", date.format("%Y-%m-%d")))
}

pub fn detail_page_path(project_dir: &Path, date: NaiveDate) -> PathBuf {
    project_dir.join(format!("{}.html", date.format("%Y-%m-%d")))
}

/// Dates of every `images/clue-YYYY-MM-DD.jpg`, newest first.
pub fn clue_dates(project_dir: &Path) -> Result<Vec<NaiveDate>> {
    let images_dir = project_dir.join(IMAGES_DIR);
    let entries = fs::read_dir(&images_dir)
        .with_context(|| format!("reading {}", images_dir.display()))?;

    let mut dates = Vec::new();
    for entry in entries {
        let file_name = entry?.file_name();
        let file_name = file_name.to_string_lossy();
        let Some(caps) = CLUE_FILE.captures(&file_name) else {
            continue;
        };
        match NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
            Ok(date) => dates.push(date),
            Err(_) => warn!("skipping clue image with invalid date: {}", file_name),
        }
    }
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();
    Ok(dates)
}

fn facts_section(page: &PlayerPage) -> String {
    let mut html = String::new();
    html.push_str(
        r#"<div class="facts-header">
                            <h3>Career Highlights &amp; Facts</h3>
                            <p class="disclaimer">(Facts are AI-generated and may require verification)</p>
                        </div>
                        <ul>
"#,
    );
    for fact in &page.facts {
        html.push_str(&format!("                        <li>{}</li>\n", html_escape(fact)));
    }
    html.push_str("                        </ul>");

    if !page.qa.is_empty() {
        html.push_str("\n                        <h3>Trivia Questions</h3>\n                        <ol class=\"qa-list\">\n");
        for pair in &page.qa {
            html.push_str(&format!(
                "                        <li><p class=\"question\">{}</p><p class=\"answer\">{}</p></li>\n",
                html_escape(&pair.question),
                html_escape(&pair.answer)
            ));
        }
        html.push_str("                        </ol>");
    }
    html
}

fn totals_table(page: &PlayerPage) -> String {
    if !page.career_totals.has_values() {
        return String::new();
    }
    let header: String = page
        .career_totals
        .labels()
        .map(|label| format!("<th>{}</th>", html_escape(label)))
        .collect();
    let row: String = page
        .career_totals
        .iter()
        .map(|(_, value)| format!("<td>{}</td>", html_escape(value)))
        .collect();

    format!(
        r#"
                <div class="stats-table-container">
                    <h3>Career Totals</h3>
                    <div class="table-wrapper">
                        <table>
                            <thead><tr>{}</tr></thead>
                            <tbody><tr>{}</tr></tbody>
                        </table>
                    </div>
                    <p class="citation">Statistics via Baseball-Reference.com</p>
                </div>"#,
        header, row
    )
}

fn team_colors_js() -> String {
    let entries: Vec<String> = TEAM_COLORS
        .iter()
        .map(|(abbr, (r, g, b), name)| {
            format!(
                "                '{}': {{ bg: 'rgba({}, {}, {}, 0.7)', border: 'rgb({}, {}, {})', name: '{}' }}",
                abbr, r, g, b, r, g, b, name
            )
        })
        .collect();
    format!("{{\n{}\n            }}", entries.join(",\n"))
}

fn war_chart(yearly: &[YearlyPerformanceRecord]) -> Result<String> {
    if yearly.is_empty() {
        return Ok(String::new());
    }
    let years: Vec<&str> = yearly.iter().map(|r| r.year.as_str()).collect();
    let war: Vec<f64> = yearly.iter().map(|r| r.war).collect();
    let teams: Vec<&str> = yearly.iter().map(|r| r.display_team.as_str()).collect();

    Ok(format!(
        r#"
                <div class="chart-container">
                    <h3>Career Arc by WAR</h3>
                    <div class="chart-wrapper">
                        <canvas id="careerArcChart"></canvas>
                    </div>
                </div>
                <script src="{chart_js}"></script>
                <script>
            const years = {years};
            const warData = {war};
            const teamsByYear = {teams};
            const teamColors = {colors};

            const waterfallData = [];
            let cumulativeTotal = 0;
            for (const war of warData) {{
                waterfallData.push([cumulativeTotal, cumulativeTotal + war]);
                cumulativeTotal += war;
            }}
            waterfallData.push([0, cumulativeTotal]);

            const colorFor = team => teamColors[team] || teamColors['Default'];
            const backgroundColors = teamsByYear.map(team => colorFor(team).bg);
            backgroundColors.push(teamColors['Total'].bg);
            const borderColors = teamsByYear.map(team => colorFor(team).border);
            borderColors.push(teamColors['Total'].border);

            new Chart(document.getElementById('careerArcChart').getContext('2d'), {{
                type: 'bar',
                data: {{
                    labels: [...years, 'Career Total'],
                    datasets: [{{
                        label: 'WAR',
                        data: waterfallData,
                        backgroundColor: backgroundColors,
                        borderColor: borderColors,
                        borderWidth: 2,
                        borderRadius: 4,
                    }}]
                }},
                options: {{
                    responsive: true,
                    maintainAspectRatio: false,
                    plugins: {{
                        tooltip: {{
                            callbacks: {{
                                label: function(context) {{
                                    const i = context.dataIndex;
                                    if (i < warData.length) {{
                                        return `${{years[i]}} (${{teamsByYear[i]}}): ${{warData[i].toFixed(1)}}`;
                                    }}
                                    return `Total Career WAR: ${{cumulativeTotal.toFixed(1)}}`;
                                }}
                            }}
                        }},
                        legend: {{
                            display: true,
                            position: 'bottom',
                            labels: {{
                                padding: 20,
                                font: {{ size: 10 }},
                                generateLabels: function() {{
                                    const items = [...new Set(teamsByYear)].map(team => {{
                                        const info = colorFor(team);
                                        return {{ text: info.name, fillStyle: info.bg, strokeStyle: info.border, lineWidth: 2 }};
                                    }});
                                    const total = teamColors['Total'];
                                    items.push({{ text: total.name, fillStyle: total.bg, strokeStyle: total.border, lineWidth: 2 }});
                                    return items;
                                }}
                            }}
                        }}
                    }},
                    scales: {{
                        x: {{ grid: {{ display: false }}, ticks: {{ maxTicksLimit: 15 }} }}
                    }}
                }}
            }});
                </script>"#,
        chart_js = CHART_JS_URL,
        years = script_json(&years)?,
        war = script_json(&war)?,
        teams = script_json(&teams)?,
        colors = team_colors_js(),
    ))
}

/// Render the answer page for one trivia date.
pub fn render_detail_page(page: &PlayerPage, date: NaiveDate) -> Result<String> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let search_data = serde_json::to_string(&SearchData::from_yearly(&page.yearly_war))?;

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Answer for {date_str} | Name That Yankee</title>
    <link rel="stylesheet" href="style.css">
</head>
<body>
    <header>
        <h1>The answer for {long_date} is...</h1>
    </header>

    <main>
        <a href="index.html" class="back-link">&larr; Back to All Questions</a>

        <div class="detail-layout">
            <div class="left-column">
                <div class="player-profile">
                    <div class="player-photo">
                        <img src="images/answer-{date_str}.jpg" alt="Photo of {name}">
                    </div>
                    <div class="player-info">
                        <h2>{display_name}</h2>
                        {facts}
                    </div>
                </div>{totals}
            </div>
            <div class="right-column">
                <div class="original-card">
                    <h3>The Original Clue</h3>
                    <img src="images/clue-{date_str}.jpg" alt="Original trivia card">
                </div>{chart}
            </div>
        </div>
        <div id="search-data" style="display:none;">{search_data}</div>
    </main>
</body>
</html>
"#,
        date_str = date_str,
        long_date = long_date(date),
        name = html_escape(&page.name),
        display_name = html_escape(&page.display_name()),
        facts = facts_section(page),
        totals = totals_table(page),
        chart = war_chart(&page.yearly_war)?,
        search_data = html_escape(&search_data),
    ))
}

/// Write `<project_dir>/<YYYY-MM-DD>.html`, replacing any existing page.
pub fn generate_detail_page(page: &PlayerPage, date: NaiveDate, project_dir: &Path) -> Result<PathBuf> {
    let html = render_detail_page(page, date)?;
    let path = detail_page_path(project_dir, date);
    fs::write(&path, html).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "detail page saved");
    Ok(path)
}

/// Teams and years recorded on an existing detail page, if any.
fn read_search_data(detail_path: &Path) -> Option<SearchData> {
    let content = fs::read_to_string(detail_path).ok()?;
    let doc = Html::parse_document(&content);
    let div = doc.select(&css("div#search-data")).next()?;
    match serde_json::from_str(&trimmed_text(div)) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(path = %detail_path.display(), "unreadable search data: {}", e);
            None
        }
    }
}

fn search_terms(date: NaiveDate, data: Option<&SearchData>) -> String {
    let mut terms = long_date(date).to_lowercase().replace(',', "");
    if let Some(data) = data {
        for team in &data.teams {
            terms.push(' ');
            terms.push_str(&team.to_lowercase());
        }
        for year in &data.years {
            terms.push(' ');
            terms.push_str(year);
        }
        for team in &data.teams {
            if let Some((_, full)) = TEAM_SEARCH_NAMES.iter().find(|(abbr, _)| abbr == team) {
                terms.push(' ');
                terms.push_str(full);
            }
        }
    }
    terms
}

fn gallery_tile(project_dir: &Path, date: NaiveDate) -> String {
    let date_str = date.format("%Y-%m-%d").to_string();
    let data = read_search_data(&detail_page_path(project_dir, date));
    format!(
        r#"
            <div class="gallery-container" data-search-terms="{terms}">
                <a href="{date_str}.html" class="gallery-item">
                    <img src="images/clue-{date_str}.jpg" alt="Name that Yankee trivia card from {date_str}">
                    <div class="gallery-item-overlay"><span>Click to Reveal</span></div>
                </a>
                <p class="gallery-date">Trivia Date: {long_date}</p>
            </div>"#,
        terms = html_escape(&search_terms(date, data.as_ref())),
        date_str = date_str,
        long_date = long_date(date),
    )
}

/// Inner HTML range of the `name` element whose opening tag ends at
/// `open_end`, found by counting nested tags of the same name.
fn inner_range(html: &str, name: &str, open_end: usize) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    for tag in ANY_TAG.captures_iter(&html[open_end..]) {
        if !tag[2].eq_ignore_ascii_case(name) {
            continue;
        }
        if tag[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                let close = tag.get(0)?;
                return Some((open_end, open_end + close.start()));
            }
        }
    }
    None
}

fn first_element(html: &str, name: &str) -> Option<(usize, usize)> {
    let open = ANY_TAG
        .captures_iter(html)
        .find(|tag| tag[1].is_empty() && tag[2].eq_ignore_ascii_case(name))?;
    inner_range(html, name, open.get(0)?.end())
}

/// Inner HTML range of the first element carrying the `gallery` class.
fn gallery_inner_range(html: &str) -> Option<(usize, usize)> {
    let open = CLASSED_TAG.captures_iter(html).find(|tag| {
        tag.get(2)
            .or_else(|| tag.get(3))
            .is_some_and(|classes| classes.as_str().split_whitespace().any(|c| c == "gallery"))
    })?;
    inner_range(html, &open[1], open.get(0)?.end())
}

/// Replace the contents of the first `<p>` inside `<footer>` with `stamp`.
/// `None` when the page has no footer or the footer has no paragraph.
fn stamp_footer(html: &str, stamp: &str) -> Option<String> {
    let (footer_start, footer_end) = first_element(html, "footer")?;
    let (p_start, p_end) = first_element(&html[footer_start..footer_end], "p")?;
    let mut stamped = String::with_capacity(html.len() + stamp.len());
    stamped.push_str(&html[..footer_start + p_start]);
    stamped.push_str(stamp);
    stamped.push_str(&html[footer_start + p_end..]);
    Some(stamped)
}

/// Rebuild the gallery in `index.html` from every clue image on disk and stamp
/// the footer with `today`.
pub fn rebuild_index(project_dir: &Path, today: NaiveDate) -> Result<()> {
    let index_path = project_dir.join(INDEX_FILE);
    if !index_path.exists() {
        bail!("index.html not found at {}", index_path.display());
    }
    let html = fs::read_to_string(&index_path)
        .with_context(|| format!("reading {}", index_path.display()))?;

    let dates = clue_dates(project_dir)?;
    let mut tiles: String = dates.iter().map(|d| gallery_tile(project_dir, *d)).collect();
    tiles.push_str("\n        ");

    let Some((start, end)) = gallery_inner_range(&html) else {
        bail!("no element with class \"gallery\" in {}", index_path.display());
    };
    let mut rebuilt = String::with_capacity(html.len() + tiles.len());
    rebuilt.push_str(&html[..start]);
    rebuilt.push_str(&tiles);
    rebuilt.push_str(&html[end..]);

    let stamp = format!("Last Updated: {}", long_date(today));
    let rebuilt = match stamp_footer(&rebuilt, &stamp) {
        Some(stamped) => stamped,
        None => {
            warn!(path = %index_path.display(), "no <p> inside <footer>, last-updated date not stamped");
            rebuilt
        }
    };

    fs::write(&index_path, rebuilt).with_context(|| format!("writing {}", index_path.display()))?;
    info!(tiles = dates.len(), "index.html rebuilt");
    Ok(())
}
