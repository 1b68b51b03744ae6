use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

/// Determines the number of worker threads to use: 0 means one per
/// logical core.
pub fn get_num_threads(cli_threads: usize) -> usize {
    let num_threads = if cli_threads == 0 {
        num_cpus::get()
    } else {
        cli_threads
    };
    debug!("Using {} threads for processing.", num_threads);
    num_threads
}

/// Collapses every run of non-word characters into a single underscore;
/// the naming rule for stored genome files and collection directories.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// A styled progress bar for batch operations.
pub fn progress_bar(len: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(message.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_runs() {
        assert_eq!(slugify("E. coli K-12"), "E_coli_K_12");
        assert_eq!(slugify("NC_000913.3"), "NC_000913_3");
        assert_eq!(slugify("plain"), "plain");
        assert_eq!(slugify("  "), "_");
    }

    #[test]
    fn test_get_num_threads_zero_means_all() {
        assert!(get_num_threads(0) >= 1);
        assert_eq!(get_num_threads(3), 3);
    }
}
