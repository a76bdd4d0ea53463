//! Call-site identity.
//!
//! A [`CallSite`] names one instrumented source location. Identity for
//! registry lookup is `(file, function, line)` -- the description is
//! carried for the report but excluded from equality, so the first
//! registration's description wins. The total order is `(line, file,
//! function)`: line dominates, which means a sorted registry is NOT
//! grouped by file. That ordering is part of the report format and must
//! not change.

use std::cmp::Ordering;

/// Identity of one instrumented source location.
#[derive(Debug, Clone)]
pub struct CallSite {
    file: String,
    function: String,
    line: u32,
    description: String,
}

impl CallSite {
    /// Build a call site. `file` keeps only its final path component so
    /// reports stay readable regardless of where the crate was compiled.
    pub fn new(file: &str, function: &str, line: u32, description: &str) -> Self {
        let file = file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(file)
            .to_owned();
        Self {
            file,
            function: function.to_owned(),
            line,
            description: description.to_owned(),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// One-line identity rendering used by the report.
    pub(crate) fn identity_line(&self) -> String {
        format!(
            "FileName:{}, Function:{}, Line:{}",
            self.file, self.function, self.line
        )
    }
}

// Description is not part of identity: two registrations at the same
// site with different descriptions collide onto the same section.
impl PartialEq for CallSite {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file && self.function == other.function && self.line == other.line
    }
}

impl Eq for CallSite {}

impl PartialOrd for CallSite {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Consistent with Eq: compares exactly the identity fields, line first.
impl Ord for CallSite {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.file.cmp(&other.file))
            .then_with(|| self.function.cmp(&other.function))
    }
}
