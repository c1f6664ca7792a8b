use std::sync::Arc;

use colored::Colorize;

use crate::config::Config;
use crate::error::{SheetError, SheetResult};
use crate::grid::extract_spreadsheet_id;
use crate::orchestrator::{OrchestratorSettings, ProcessOptions, ProcessOutcome, ProcessingOrchestrator};
use crate::reconstruct::reconstruct_page;
use crate::store::{ContentStore, FileContentStore};
use crate::types::{ProcessingStatus, Sheet};

/// Widest cell shown by `show` before truncating
const MAX_DISPLAY_WIDTH: usize = 40;

fn open_store(config: &Config) -> Arc<dyn ContentStore> {
    Arc::new(FileContentStore::new(&config.storage.data_dir))
}

fn build_orchestrator(config: &Config) -> SheetResult<Arc<ProcessingOrchestrator>> {
    Ok(Arc::new(ProcessingOrchestrator::new(
        open_store(config),
        config.grid_source()?,
        OrchestratorSettings::from(config),
    )))
}

/// Arguments of the register command
#[derive(Debug, Clone)]
pub struct RegisterArgs {
    pub id: String,
    pub course_id: String,
    pub name: String,
    /// Spreadsheet URL or bare id
    pub spreadsheet: String,
    pub tab: Option<String>,
    pub open: bool,
}

/// Execute the register command
pub async fn register(config: &Config, args: RegisterArgs) -> SheetResult<()> {
    println!("{}", "📋 Registering sheet".bold().green());

    let spreadsheet_id = extract_spreadsheet_id(&args.spreadsheet)?;
    let mut sheet = Sheet::new(args.id, args.course_id, args.name, spreadsheet_id)
        .with_requires_membership(!args.open);
    if let Some(tab) = args.tab {
        sheet = sheet.with_tab(tab);
    }

    open_store(config).register_sheet(sheet.clone()).await?;

    println!("   Sheet:       {}", sheet.id.bright_blue().bold());
    println!("   Course:      {}", sheet.course_id);
    println!("   Spreadsheet: {}", sheet.spreadsheet_id);
    if let Some(tab) = &sheet.tab {
        println!("   Tab:         {}", tab);
    }
    if !sheet.requires_membership {
        println!("   {}", "Open to all users".yellow());
    }
    println!();
    println!("{}", "✅ Sheet registered".bold().green());
    Ok(())
}

/// Execute the process command
pub async fn process(config: &Config, sheet_id: &str, verbose: bool) -> SheetResult<()> {
    println!("{}", "🔄 Processing sheet".bold().green());
    println!("   Sheet: {}", sheet_id.bright_blue().bold());
    println!("   Mode:  {}", config.processing.storage_mode);
    println!();

    let orchestrator = build_orchestrator(config)?;
    let outcome = orchestrator
        .process(
            sheet_id,
            ProcessOptions {
                use_cache: false,
                force_refresh: true,
                background: false,
            },
        )
        .await?;

    let ProcessOutcome::Completed(report) = outcome else {
        return Err(SheetError::Storage(
            "processing returned before completion".into(),
        ));
    };

    println!(
        "{}",
        format!("✅ Stored {} rows", report.processed_count)
            .bold()
            .green()
    );
    if report.errors.is_empty() {
        return Ok(());
    }

    println!(
        "{}",
        format!("⚠️  {} rows skipped", report.errors.len()).yellow()
    );
    if verbose {
        for failure in &report.errors {
            println!("   row {}: {}", failure.row_index, failure.message.red());
        }
    }
    Ok(())
}

fn print_status(sheet: &Sheet, status: &ProcessingStatus) {
    if !status.processed {
        println!("   {} {}", sheet.id.bright_blue().bold(), "not processed".yellow());
        return;
    }
    let when = status
        .processed_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    let mode = status
        .storage_mode
        .map(|m| m.to_string())
        .unwrap_or_default();
    println!(
        "   {} {} rows, {} errors, {} ({})",
        sheet.id.bright_blue().bold(),
        status.row_count,
        status.error_count,
        when,
        mode
    );
}

/// Execute the status command; all sheets when `sheet_id` is `None`
pub async fn status(config: &Config, sheet_id: Option<&str>) -> SheetResult<()> {
    println!("{}", "📊 Sheet status".bold().green());

    let store = open_store(config);
    let sheets = match sheet_id {
        Some(id) => vec![store.get_sheet(id).await?],
        None => store.list_sheets(None).await?,
    };

    if sheets.is_empty() {
        println!("   {}", "No sheets registered".yellow());
        return Ok(());
    }
    for sheet in &sheets {
        let status = store.get_processing_status(&sheet.id).await?;
        print_status(sheet, &status);
    }
    Ok(())
}

fn display(value: &str) -> String {
    if value.chars().count() <= MAX_DISPLAY_WIDTH {
        return value.to_string();
    }
    let mut shown: String = value.chars().take(MAX_DISPLAY_WIDTH - 1).collect();
    shown.push('…');
    shown
}

/// Execute the show command
pub async fn show(
    config: &Config,
    sheet_id: &str,
    page: usize,
    limit: usize,
    json: bool,
) -> SheetResult<()> {
    let store = open_store(config);
    let content = store.get_content(sheet_id).await?;
    let page = reconstruct_page(&content, page, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "📄 {} - page {}/{} ({} rows)",
            sheet_id,
            page.page,
            page.total_pages.max(1),
            page.total_rows
        )
        .bold()
        .green()
    );

    if let Some(header) = page.grid.values.first() {
        let titles: Vec<String> = header.iter().map(|h| display(h)).collect();
        println!("   {}", titles.join(" | ").bold());
    }

    for (r, row) in page.grid.cells.iter().enumerate() {
        let rendered: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                None => "↖".dimmed().to_string(),
                Some(cell) if cell.url.is_some() => display(&cell.value).underline().to_string(),
                Some(cell) => display(&cell.value),
            })
            .collect();
        println!(
            "{:>5} {}",
            (page.row_offset + r).to_string().dimmed(),
            rendered.join(" | ")
        );
    }

    if page.has_more {
        println!();
        println!("   {}", format!("more: --page {}", page.page + 1).cyan());
    }
    Ok(())
}

/// Execute the clear command
pub async fn clear(config: &Config, sheet_id: &str) -> SheetResult<()> {
    let store = open_store(config);
    store.get_sheet(sheet_id).await?;

    if store.clear_content(sheet_id).await? {
        println!("{}", format!("🗑️  Cleared content of {}", sheet_id).bold().green());
    } else {
        println!("{}", format!("Nothing stored for {}", sheet_id).yellow());
    }
    Ok(())
}
