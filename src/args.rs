use clap::Parser;

/// This is a reconciliation program for daily transit dispatch spreadsheets.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the run: the input spreadsheets, the output and the rules.
    /// For more information about the file format, read the documentation of the trip_reconcile::manual module.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference run summary in JSON format. If provided, tripreco will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path or 'stdout') If specified, the summary of the run will be written in JSON format to the given
    /// location. Setting this option overrides the summary path that may be specified in the configuration.
    #[clap(long, value_parser)]
    pub out: Option<String>,

    /// (file path) The output workbook. Setting this option overrides the output path of the configuration.
    #[clap(short, long, value_parser)]
    pub output: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
