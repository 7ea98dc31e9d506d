use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(sim_deck::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(sim_deck::config::invalid))]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    #[diagnostic(code(sim_deck::config::missing_field))]
    MissingField { field: String },

    /// A button must reference exactly one of a combo or a macro.
    #[error("Button '{id}' in profile '{profile}' {problem}")]
    #[diagnostic(
        code(sim_deck::config::invalid_button),
        help("give the button either combo=\"...\" or macro=\"...\", not both")
    )]
    InvalidButton {
        profile: String,
        id: String,
        problem: String,
        #[source_code]
        src: String,
        #[label("defined here")]
        span: miette::SourceSpan,
    },

    #[error("Button '{id}' in profile '{profile}' references undefined macro '{macro_name}'")]
    #[diagnostic(code(sim_deck::config::unknown_macro))]
    UnknownMacroRef {
        profile: String,
        id: String,
        macro_name: String,
    },

    #[error("Macro '{name}' in profile '{profile}' has no steps")]
    #[diagnostic(code(sim_deck::config::empty_macro))]
    EmptyMacro { profile: String, name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
