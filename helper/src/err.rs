use std::fmt;

/// Failures from independent attempts over a batch, kept individual so one
/// item's error never masks the others.
#[derive(Debug, Default)]
pub struct IndividualErrorList {
    list: Vec<anyhow::Error>,
}

impl IndividualErrorList {
    pub fn new() -> Self { IndividualErrorList { list: Vec::new() } }

    pub fn push(&mut self, error: anyhow::Error) { self.list.push(error); }

    pub fn is_empty(&self) -> bool { self.list.is_empty() }

    pub fn len(&self) -> usize { self.list.len() }

    pub fn iter(&self) -> impl Iterator<Item = &anyhow::Error> {
        self.list.iter()
    }
}

impl fmt::Display for IndividualErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.list)
    }
}

impl From<Vec<anyhow::Error>> for IndividualErrorList {
    fn from(list: Vec<anyhow::Error>) -> Self { IndividualErrorList { list } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_accumulates_and_reports() {
        let mut errors = IndividualErrorList::new();
        assert!(errors.is_empty());
        errors.push(anyhow!("first"));
        errors.push(anyhow!("second"));
        assert_eq!(errors.len(), 2);
        let rendered = format!("{}", errors);
        assert!(rendered.contains("first"));
        assert!(rendered.contains("second"));
    }

    #[test]
    fn test_from_vec() {
        let errors =
            IndividualErrorList::from(vec![anyhow!("a"), anyhow!("b")]);
        assert_eq!(errors.len(), 2);
    }
}
