//! Career totals and year-by-year WAR from a rendered player profile page.
//!
//! Both parsers are pure: the same document always yields the same values, and
//! anything missing from the page comes back as `None` or an empty list.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{CaseSensitivity, ElementRef, Html, Selector};
use tracing::debug;

use crate::types::{CareerTotals, PlayerType, YearlyPerformanceRecord};
use crate::utils::{css, stripped_text, trimmed_text};

const CAREER_LABEL: &str = "Career";
const PARTIAL_ROW_CLASS: &str = "partial_table";
const HEADER_ROW_CLASS: &str = "thead";

static PULLOUT: LazyLock<Selector> = LazyLock::new(|| css("div.stats_pullout"));
static DIV: LazyLock<Selector> = LazyLock::new(|| css("div"));
static P: LazyLock<Selector> = LazyLock::new(|| css("p"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| css("span"));
static STAT_GROUPS: LazyLock<Selector> = LazyLock::new(|| css("div.p1, div.p2, div.p3"));
static INFO_PARAGRAPHS: LazyLock<Selector> = LazyLock::new(|| css("div#info p"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| css("table"));
static TBODY: LazyLock<Selector> = LazyLock::new(|| css("tbody"));
static ROW: LazyLock<Selector> = LazyLock::new(|| css("tr"));
static YEAR_CELL: LazyLock<Selector> = LazyLock::new(|| css(r#"th[data-stat="year_id"]"#));
static TEAM_CELL: LazyLock<Selector> = LazyLock::new(|| css(r#"td[data-stat="team_name_abbr"]"#));

/// Career values from the summary pullout.
///
/// The "Career" column is located by label; active players carry extra season
/// columns before it, so its position varies.
pub fn parse_career_totals(doc: &Html) -> Option<CareerTotals> {
    let pullout = doc.select(&PULLOUT).next()?;
    let header = pullout.select(&DIV).next()?;

    let labels: Vec<String> = header.select(&P).map(stripped_text).collect();
    let career_index = labels.iter().position(|l| l == CAREER_LABEL)?;

    let groups: Vec<ElementRef> = pullout.select(&STAT_GROUPS).collect();
    if groups.is_empty() {
        return None;
    }

    let mut totals = CareerTotals::new();
    for group in groups {
        for stat in group.select(&DIV) {
            let Some(label) = stat.select(&SPAN).next() else {
                continue;
            };
            let values: Vec<ElementRef> = stat.select(&P).collect();
            if let Some(value) = values.get(career_index) {
                totals.insert(stripped_text(label), stripped_text(*value));
            }
        }
    }

    debug!(stats = totals.len(), career_index, "parsed career totals");
    Some(totals)
}

/// Hitter unless the bio block names the player a pitcher
pub fn detect_player_type(doc: &Html) -> PlayerType {
    let is_pitcher = doc.select(&INFO_PARAGRAPHS).any(|p| {
        let text: String = p.text().collect();
        text.contains("Position:") && text.contains("Pitcher")
    });
    if is_pitcher {
        PlayerType::Pitcher
    } else {
        PlayerType::Hitter
    }
}

/// Where a stats table was found. Tables recovered from comments live in their
/// own parsed fragment.
enum TableSource<'a> {
    Inline(ElementRef<'a>),
    Comment(Html),
}

type TableLookup = for<'a> fn(&'a Html, &str) -> Option<TableSource<'a>>;

/// Tried in order; the first hit wins.
const TABLE_LOOKUPS: &[(&str, TableLookup)] = &[
    ("container", table_in_container),
    ("document", table_in_document),
    ("comment", table_in_comment),
];

fn table_in_container<'a>(doc: &'a Html, table_id: &str) -> Option<TableSource<'a>> {
    let table_sel = Selector::parse(&format!("table#{}", table_id)).ok()?;
    ["switcher", "all"].iter().find_map(|prefix| {
        let container_sel = Selector::parse(&format!("div#{}_{}", prefix, table_id)).ok()?;
        let container = doc.select(&container_sel).next()?;
        container.select(&table_sel).next().map(TableSource::Inline)
    })
}

fn table_in_document<'a>(doc: &'a Html, table_id: &str) -> Option<TableSource<'a>> {
    let table_sel = Selector::parse(&format!("table#{}", table_id)).ok()?;
    doc.select(&table_sel).next().map(TableSource::Inline)
}

/// The site ships some tables inside HTML comments and swaps them in with script.
fn table_in_comment<'a>(doc: &'a Html, table_id: &str) -> Option<TableSource<'a>> {
    let marker = format!("id=\"{}\"", table_id);
    let comment = doc
        .tree
        .values()
        .filter_map(|node| node.as_comment())
        .find(|comment| comment.contains(&marker))?;

    let fragment = Html::parse_fragment(comment);
    if fragment.select(&TABLE).next().is_none() {
        return None;
    }
    Some(TableSource::Comment(fragment))
}

fn locate_table<'a>(doc: &'a Html, table_id: &str) -> Option<TableSource<'a>> {
    TABLE_LOOKUPS.iter().find_map(|(strategy, lookup)| {
        let found = lookup(doc, table_id)?;
        debug!(table_id, strategy, "located stats table");
        Some(found)
    })
}

fn has_class(row: ElementRef<'_>, class: &str) -> bool {
    row.value().has_class(class, CaseSensitivity::CaseSensitive)
}

fn cell_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector).next().map(trimmed_text)
}

/// Year-by-year WAR with every team of split seasons, sorted by year
pub fn parse_yearly(doc: &Html) -> Vec<YearlyPerformanceRecord> {
    let player_type = detect_player_type(doc);
    let table_id = player_type.table_id();
    debug!(player_type = player_type.as_str(), table_id, "reading yearly table");

    match locate_table(doc, table_id) {
        Some(TableSource::Inline(table)) => yearly_from_table(table, player_type),
        Some(TableSource::Comment(fragment)) => match fragment.select(&TABLE).next() {
            Some(table) => yearly_from_table(table, player_type),
            None => Vec::new(),
        },
        None => {
            debug!(table_id, "stats table not found in any location");
            Vec::new()
        }
    }
}

fn yearly_from_table(table: ElementRef<'_>, player_type: PlayerType) -> Vec<YearlyPerformanceRecord> {
    let Some(body) = table.select(&TBODY).next() else {
        return Vec::new();
    };
    let rows: Vec<ElementRef> = body.select(&ROW).collect();

    let mut teams_per_year: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows.iter().filter(|r| has_class(**r, PARTIAL_ROW_CLASS)) {
        if let (Some(year), Some(team)) = (cell_text(*row, &YEAR_CELL), cell_text(*row, &TEAM_CELL)) {
            teams_per_year.entry(year).or_default().push(team);
        }
    }

    let Ok(war_cell) = Selector::parse(&format!("td[data-stat=\"{}\"]", player_type.war_stat())) else {
        return Vec::new();
    };

    let mut yearly: Vec<YearlyPerformanceRecord> = rows
        .iter()
        .filter(|row| {
            !has_class(**row, PARTIAL_ROW_CLASS)
                && !has_class(**row, HEADER_ROW_CLASS)
                && row.value().id().is_some_and(|id| !id.is_empty())
        })
        .filter_map(|row| {
            let year = cell_text(*row, &YEAR_CELL).filter(|y| !y.is_empty())?;
            let display_team = cell_text(*row, &TEAM_CELL)?;
            // Blank WAR marks a non-qualifying season; drop it rather than invent a zero.
            let war = cell_text(*row, &war_cell)?
                .parse::<f64>()
                .ok()
                .filter(|w| w.is_finite())?;
            let teams = teams_per_year
                .get(&year)
                .cloned()
                .unwrap_or_else(|| vec![display_team.clone()]);
            Some(YearlyPerformanceRecord {
                year,
                teams,
                display_team,
                war,
            })
        })
        .collect();

    yearly.sort_by(|a, b| a.year.cmp(&b.year));
    yearly
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pullout(labels: &[&str], stats: &[(&str, &[&str])]) -> String {
        let label_html: String = labels.iter().map(|l| format!("<p>{}</p>", l)).collect();
        let stats_html: String = stats
            .iter()
            .map(|(label, values)| {
                let values: String = values.iter().map(|v| format!("<p>{}</p>", v)).collect();
                format!("<div><span><strong>{}</strong></span>{}</div>", label, values)
            })
            .collect();
        format!(
            r#"<html><body><div class="stats_pullout"><div>{}</div><div class="p1">{}</div></div></body></html>"#,
            label_html, stats_html
        )
    }

    fn batting_page(info: &str, table: &str) -> String {
        format!(
            r#"<html><body><div id="info"><p><strong>Position:</strong> {}</p></div>{}</body></html>"#,
            info, table
        )
    }

    fn row(id: Option<&str>, class: &str, year: &str, team: &str, war_stat: &str, war: &str) -> String {
        let id_attr = id.map(|i| format!(r#" id="{}""#, i)).unwrap_or_default();
        format!(
            r#"<tr{} class="{}"><th data-stat="year_id"><a>{}</a></th><td data-stat="team_name_abbr">{}</td><td data-stat="{}">{}</td></tr>"#,
            id_attr, class, year, team, war_stat, war
        )
    }

    fn table(id: &str, rows: &[String]) -> String {
        format!(
            r#"<table id="{}"><thead><tr><th>Year</th></tr></thead><tbody>{}</tbody></table>"#,
            id,
            rows.concat()
        )
    }

    #[test]
    fn test_career_column_found_by_label() {
        let html = pullout(
            &["2023", "2024", "Career"],
            &[("HR", &["10", "12", "287"]), ("BA", &[".250", ".301", ".287"])],
        );
        let totals = parse_career_totals(&Html::parse_document(&html)).unwrap();
        assert_eq!(totals.get("HR"), Some("287"));
        assert_eq!(totals.get("BA"), Some(".287"));
        assert_eq!(totals.labels().collect::<Vec<_>>(), vec!["HR", "BA"]);
    }

    #[test]
    fn test_career_column_independent_of_panel_width() {
        for labels in [
            vec!["Career"],
            vec!["Career", "2024"],
            vec!["2024", "Career"],
            vec!["2022", "2023", "2024", "Career"],
        ] {
            let values: Vec<&str> = labels
                .iter()
                .map(|l| if *l == "Career" { "60.3" } else { "1.0" })
                .collect();
            let html = pullout(&labels, &[("WAR", &values)]);
            let totals = parse_career_totals(&Html::parse_document(&html)).unwrap();
            assert_eq!(totals.get("WAR"), Some("60.3"), "labels {:?}", labels);
        }
    }

    #[test]
    fn test_career_totals_absent_without_career_label() {
        let html = pullout(&["2023", "2024"], &[("HR", &["10", "12"])]);
        assert!(parse_career_totals(&Html::parse_document(&html)).is_none());
    }

    #[test]
    fn test_career_totals_absent_without_panel_or_groups() {
        let no_panel = Html::parse_document("<html><body><p>Career</p></body></html>");
        assert!(parse_career_totals(&no_panel).is_none());

        let no_groups = Html::parse_document(
            r#"<div class="stats_pullout"><div><p>Career</p></div><div class="p9"><div><span>HR</span><p>1</p></div></div></div>"#,
        );
        assert!(parse_career_totals(&no_groups).is_none());
    }

    #[test]
    fn test_career_totals_skips_short_stat_rows() {
        let html = pullout(
            &["2024", "Career"],
            &[("HR", &["12", "287"]), ("SB", &["3"])],
        );
        let totals = parse_career_totals(&Html::parse_document(&html)).unwrap();
        assert_eq!(totals.get("HR"), Some("287"));
        assert_eq!(totals.get("SB"), None);
    }

    #[test]
    fn test_multi_team_season_merged() {
        let rows = vec![
            row(Some("players_standard_batting.2000"), "full", "2000", "BOS", "b_war", "3.1"),
            row(None, "partial_table", "2001", "BOS", "b_war", "2.0"),
            row(None, "partial_table", "2001", "NYY", "b_war", "2.5"),
            row(Some("players_standard_batting.2001"), "full", "2001", "2TM", "b_war", "4.5"),
        ];
        let html = batting_page("Third Baseman", &table("players_standard_batting", &rows));
        let yearly = parse_yearly(&Html::parse_document(&html));

        assert_eq!(yearly.len(), 2);
        assert_eq!(
            yearly[1],
            YearlyPerformanceRecord {
                year: "2001".into(),
                teams: vec!["BOS".into(), "NYY".into()],
                display_team: "2TM".into(),
                war: 4.5,
            }
        );
        assert_eq!(yearly[0].teams, vec!["BOS".to_string()]);
        assert_eq!(yearly[0].display_team, "BOS");
    }

    #[test]
    fn test_partial_rows_after_aggregate_row() {
        let rows = vec![
            row(Some("players_standard_batting.1998"), "full", "1998", "3TM", "b_war", "1.0"),
            row(None, "partial_table", "1998", "SDP", "b_war", "0.2"),
            row(None, "partial_table", "1998", "CHC", "b_war", "0.3"),
            row(None, "partial_table", "1998", "NYM", "b_war", "0.5"),
        ];
        let html = batting_page("Outfielder", &table("players_standard_batting", &rows));
        let yearly = parse_yearly(&Html::parse_document(&html));
        assert_eq!(yearly.len(), 1);
        assert_eq!(yearly[0].teams.len(), 3);
        assert_eq!(yearly[0].display_team, "3TM");
    }

    #[test]
    fn test_blank_war_rows_dropped() {
        let rows = vec![
            row(Some("a.1990"), "full", "1990", "NYY", "b_war", "1.2"),
            row(Some("a.1991"), "full", "1991", "NYY", "b_war", ""),
            row(Some("a.1992"), "full", "1992", "NYY", "b_war", "n/a"),
            row(Some("a.1993"), "full", "1993", "NYY", "b_war", "-0.4"),
        ];
        let html = batting_page("First Baseman", &table("players_standard_batting", &rows));
        let yearly = parse_yearly(&Html::parse_document(&html));
        let years: Vec<_> = yearly.iter().map(|r| r.year.as_str()).collect();
        assert_eq!(years, vec!["1990", "1993"]);
        assert_eq!(yearly[1].war, -0.4);
    }

    #[test]
    fn test_header_and_unlabelled_rows_skipped_and_sorted() {
        let rows = vec![
            row(Some("a.2005"), "full", "2005", "TEX", "b_war", "2.0"),
            row(Some("a.thead"), "thead", "Year", "Tm", "b_war", "WAR"),
            row(None, "full", "2004", "TEX", "b_war", "1.0"),
            row(Some("a.2003"), "full", "2003", "TEX", "b_war", "0.5"),
        ];
        let html = batting_page("Shortstop", &table("players_standard_batting", &rows));
        let yearly = parse_yearly(&Html::parse_document(&html));
        let years: Vec<_> = yearly.iter().map(|r| r.year.as_str()).collect();
        assert_eq!(years, vec!["2003", "2005"]);
    }

    #[test]
    fn test_pitcher_uses_pitching_table() {
        let batting = table(
            "players_standard_batting",
            &[row(Some("b.1999"), "full", "1999", "NYY", "b_war", "0.1")],
        );
        let pitching = table(
            "players_standard_pitching",
            &[row(Some("p.1999"), "full", "1999", "NYY", "p_war", "6.2")],
        );
        let html = batting_page("Pitcher", &format!("{}{}", batting, pitching));
        let doc = Html::parse_document(&html);
        assert_eq!(detect_player_type(&doc), PlayerType::Pitcher);
        let yearly = parse_yearly(&doc);
        assert_eq!(yearly.len(), 1);
        assert_eq!(yearly[0].war, 6.2);
    }

    #[test]
    fn test_table_in_switcher_container() {
        let rows = [row(Some("a.2010"), "full", "2010", "SEA", "b_war", "5.0")];
        let html = batting_page(
            "Catcher",
            &format!(
                r#"<div id="switcher_players_standard_batting">{}</div>"#,
                table("players_standard_batting", &rows)
            ),
        );
        let yearly = parse_yearly(&Html::parse_document(&html));
        assert_eq!(yearly.len(), 1);
        assert_eq!(yearly[0].display_team, "SEA");
    }

    #[test]
    fn test_table_in_all_container() {
        let rows = [
            row(Some("a.2011"), "full", "2011", "NYY", "b_war", "1.5"),
            row(Some("a.2010"), "full", "2010", "SEA", "b_war", "5.0"),
        ];
        let html = batting_page(
            "Catcher",
            &format!(
                r#"<div id="preview">{}</div><div id="all_players_standard_batting"><div class="table_container">{}</div></div>"#,
                table("players_standard_batting", &[row(Some("a.1999"), "full", "1999", "BOS", "b_war", "0.1")]),
                table("players_standard_batting", &rows)
            ),
        );
        let yearly = parse_yearly(&Html::parse_document(&html));
        let years: Vec<_> = yearly.iter().map(|r| r.year.as_str()).collect();
        assert_eq!(years, vec!["2010", "2011"]);
        assert_eq!(yearly[1].display_team, "NYY");
    }

    #[test]
    fn test_table_recovered_from_comment() {
        let rows = [
            row(Some("p.1978"), "full", "1978", "NYY", "p_war", "9.4"),
            row(Some("p.1977"), "full", "1977", "NYY", "p_war", "2.2"),
        ];
        let html = batting_page(
            "Pitcher",
            &format!(
                r#"<div id="all_players_standard_pitching"><!-- {} --></div>"#,
                table("players_standard_pitching", &rows)
            ),
        );
        let yearly = parse_yearly(&Html::parse_document(&html));
        let years: Vec<_> = yearly.iter().map(|r| r.year.as_str()).collect();
        assert_eq!(years, vec!["1977", "1978"]);
    }

    #[test]
    fn test_missing_table_is_empty() {
        let html = batting_page("Pitcher", "<p>no tables here</p>");
        assert!(parse_yearly(&Html::parse_document(&html)).is_empty());
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let rows = vec![
            row(None, "partial_table", "2001", "BOS", "b_war", "2.0"),
            row(None, "partial_table", "2001", "NYY", "b_war", "2.5"),
            row(Some("a.2001"), "full", "2001", "2TM", "b_war", "4.5"),
        ];
        let html = format!(
            "{}{}",
            pullout(&["Career"], &[("HR", &["287"])]),
            batting_page("Outfielder", &table("players_standard_batting", &rows))
        );
        let doc = Html::parse_document(&html);
        assert_eq!(parse_career_totals(&doc), parse_career_totals(&doc));
        assert_eq!(parse_yearly(&doc), parse_yearly(&doc));
    }
}
