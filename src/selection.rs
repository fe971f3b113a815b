use thiserror::Error;

/// Errors that can occur while choosing a search result
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Invalid selection {0:?}: not a number")]
    NotANumber(String),

    #[error("Selection {choice} is out of range (1-{max})")]
    OutOfRange { choice: usize, max: usize },

    #[error("Could not read selection: {0}")]
    Prompt(String),
}

/// Parses a 1-based choice typed by the user into a 0-based index
///
/// `count` is the number of listed results. Surrounding whitespace is
/// ignored; anything else that is not a number in `1..=count` is rejected.
pub fn parse_selection(input: &str, count: usize) -> Result<usize, SelectionError> {
    let trimmed = input.trim();
    let choice: usize = trimmed
        .parse()
        .map_err(|_| SelectionError::NotANumber(trimmed.to_string()))?;

    if choice == 0 || choice > count {
        return Err(SelectionError::OutOfRange { choice, max: count });
    }

    Ok(choice - 1)
}
