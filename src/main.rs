use clap::{Parser, Subcommand};
use course_sheets::cli::{self, RegisterArgs};
use course_sheets::config::Config;
use course_sheets::error::SheetResult;
use course_sheets::reconstruct::DEFAULT_PAGE_LIMIT;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheets")]
#[command(about = "Ingest course spreadsheets and inspect the stored grids")]
#[command(long_about = "Sheets - spreadsheet ingestion for course portals

COMMANDS:
  register - Attach a spreadsheet tab to a course
  process  - Fetch, normalize and store a sheet
  status   - Show processing status
  show     - Print the reconstructed grid
  clear    - Drop stored content

EXAMPLES:
  sheets register grades --course cs101 --name Grades \\
      --spreadsheet https://docs.google.com/spreadsheets/d/<id>/edit
  sheets process grades -v
  sheets show grades --page 2 --limit 50")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "SHEETS_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory (overrides storage.data_dir)
    #[arg(short, long, global = true, env = "SHEETS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a spreadsheet tab for a course
    Register {
        /// Sheet id
        id: String,

        /// Owning course id
        #[arg(long = "course")]
        course_id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Spreadsheet URL or bare id
        #[arg(long)]
        spreadsheet: String,

        /// Tab title (defaults to the first tab)
        #[arg(long)]
        tab: Option<String>,

        /// Visible to users who are not enrolled
        #[arg(long)]
        open: bool,
    },

    #[command(long_about = "Fetch a sheet from the upstream provider and store it.

Rows that cannot be normalized are skipped and reported; the rest of the
sheet is still stored. A failed fetch leaves existing content untouched.")]
    /// Fetch, normalize and store a sheet
    Process {
        /// Sheet id
        sheet_id: String,

        /// List skipped rows
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show processing status (all sheets when no id is given)
    Status {
        /// Sheet id
        sheet_id: Option<String>,
    },

    /// Print the reconstructed grid
    Show {
        /// Sheet id
        sheet_id: String,

        /// 1-based page number
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Rows per page
        #[arg(short, long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop stored content for a sheet
    Clear {
        /// Sheet id
        sheet_id: String,
    },
}

#[tokio::main]
async fn main() -> SheetResult<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    match cli.command {
        Commands::Register {
            id,
            course_id,
            name,
            spreadsheet,
            tab,
            open,
        } => {
            cli::register(
                &config,
                RegisterArgs {
                    id,
                    course_id,
                    name,
                    spreadsheet,
                    tab,
                    open,
                },
            )
            .await
        }

        Commands::Process { sheet_id, verbose } => cli::process(&config, &sheet_id, verbose).await,

        Commands::Status { sheet_id } => cli::status(&config, sheet_id.as_deref()).await,

        Commands::Show {
            sheet_id,
            page,
            limit,
            json,
        } => cli::show(&config, &sheet_id, page, limit, json).await,

        Commands::Clear { sheet_id } => cli::clear(&config, &sheet_id).await,
    }
}
