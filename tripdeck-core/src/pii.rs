use std::fmt;

/// Log-safe rendering of an email: the first character of the local part
/// and the domain survive (`a***@example.com`), anything that is not an
/// email prints as `***`.
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref().trim().split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                let first = local.chars().next().unwrap_or('*');
                write!(f, "{}***@{}", first, domain)
            }
            _ => f.write_str("***"),
        }
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f)
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f)
    }
}
