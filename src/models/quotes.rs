/// a stored quote. immutable once inserted.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Quote {
    pub id: i64,
    pub author: String,
    pub content: String,
    pub channel: String,
    pub timestamp: String,
    pub community: String,
}

/// the caller-supplied fields of a quote that is about to be saved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewQuote<'a> {
    pub author: &'a str,
    pub content: &'a str,
    pub channel: &'a str,
    /// `YYYY-MM-DD HH:MM:SS`, when the original message was sent.
    pub timestamp: &'a str,
    pub community: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// which quotes a read operation looks at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scope<'a> {
    /// every quote in the store, regardless of community.
    #[default]
    Global,
    Community(&'a str),
}

impl<'a> Scope<'a> {
    pub(crate) fn community(self) -> Option<&'a str> {
        match self {
            Scope::Global => None,
            Scope::Community(community) => Some(community),
        }
    }
}
