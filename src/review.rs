//! Operator review of generated player data before the page is written.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::types::PlayerPage;
use crate::utils::osc8_file_link;

const EDIT_FILE_NAME: &str = "temp_player_data_to_edit.json";

fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed during review");
    }
    Ok(line.trim().to_string())
}

fn show<W: Write>(page: &PlayerPage, output: &mut W) -> Result<()> {
    let rule = "=".repeat(40);
    writeln!(output, "\n{}", rule)?;
    writeln!(output, "--- Please review the following data ---")?;
    writeln!(output, "Player name: {}", page.name)?;
    writeln!(output, "Nickname: {}", page.nickname)?;
    writeln!(output, "Facts:")?;
    for (i, fact) in page.facts.iter().enumerate() {
        writeln!(output, "  {}. {}", i + 1, fact)?;
    }
    if !page.qa.is_empty() {
        writeln!(output, "Questions:")?;
        for (i, pair) in page.qa.iter().enumerate() {
            writeln!(output, "  {}. {} {}", i + 1, pair.question, pair.answer)?;
        }
    }
    writeln!(output, "Career totals (from Baseball-Reference):")?;
    writeln!(output, "{}", serde_json::to_string_pretty(&page.career_totals)?)?;
    writeln!(output, "Yearly WAR (for chart):")?;
    writeln!(output, "{}", serde_json::to_string_pretty(&page.yearly_war)?)?;
    writeln!(output, "{}", rule)?;
    Ok(())
}

/// Show `page` and ask whether it is correct. On "n" the data is written to a
/// scratch JSON file in `project_dir` for hand editing and read back after the
/// operator presses Enter. The scratch file never outlives this call.
pub fn review_and_edit<R, W>(
    page: PlayerPage,
    project_dir: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<PlayerPage>
where
    R: BufRead,
    W: Write,
{
    show(&page, output)?;

    let confirmed = loop {
        write!(output, "Is all of this information correct? (y/n): ")?;
        output.flush()?;
        match read_line(input)?.to_lowercase().as_str() {
            "y" => break true,
            "n" => break false,
            _ => writeln!(output, "Invalid input. Please enter 'y' or 'n'.")?,
        }
    };
    if confirmed {
        info!(player = page.name.as_str(), "data confirmed");
        return Ok(page);
    }

    let edit_path = project_dir.join(EDIT_FILE_NAME);
    let edited = edit_in_file(&page, &edit_path, input, output);
    if edit_path.exists() {
        if let Err(e) = fs::remove_file(&edit_path) {
            warn!(path = %edit_path.display(), "could not remove edit file: {}", e);
        }
    }

    match edited {
        Ok(corrected) => {
            info!(player = corrected.name.as_str(), "data updated with corrections");
            Ok(corrected)
        }
        Err(e) => {
            warn!("editing failed ({:#}), keeping the original data", e);
            Ok(page)
        }
    }
}

fn edit_in_file<R: BufRead, W: Write>(
    page: &PlayerPage,
    path: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<PlayerPage> {
    let json = serde_json::to_string_pretty(page)?;
    fs::write(path, json + "\n").with_context(|| format!("writing {}", path.display()))?;

    let shown = path.display().to_string();
    writeln!(output, "\nThe data has been written to a temporary file:")?;
    writeln!(output, "   {}", osc8_file_link(&shown, &shown))?;
    writeln!(output, "Correct any errors, SAVE the file, then return here.")?;
    write!(output, "Press Enter when you are finished editing...")?;
    output.flush()?;
    read_line(input)?;

    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let corrected: PlayerPage =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(corrected)
}
