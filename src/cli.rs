use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk scraped pages into prepared chunk records
    Prepare {
        /// Input pages JSON (defaults to <data dir>/data/pages.json)
        #[clap(short, long)]
        input: Option<String>,

        /// Output chunk records JSON (defaults to <data dir>/data/prepared_data.json)
        #[clap(short, long)]
        output: Option<String>,
    },

    /// Embed the prepared corpus and build the vector index
    Build {
        /// Prepared chunk records JSON (defaults to <data dir>/data/prepared_data.json)
        #[clap(short, long)]
        data: Option<String>,

        /// Rebuild without asking even if a persisted index exists
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Search the index and print ranked chunks
    Search {
        /// Free-text query
        query: String,

        /// Number of results (defaults to index.top_k from config)
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Ask a question; retrieves context, generates an answer, scores confidence
    Ask {
        /// The question. Omit to enter interactive chat mode.
        question: Option<String>,

        /// Number of context chunks to retrieve
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the full response object as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Print index statistics
    Stats {},

    /// Serve the query API over HTTP
    Serve {
        /// Listen address
        #[clap(short, long, default_value = "0.0.0.0:8080")]
        addr: String,
    },
}
