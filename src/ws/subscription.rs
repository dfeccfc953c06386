/// Columns subscribed when caller gives none, in wire order.
pub const DEFAULT_COLUMNS: [&str; 9] = [
    "speed",
    "odometer",
    "soc",
    "elevation",
    "est_heading",
    "est_lat",
    "est_lng",
    "power",
    "shift_state",
];

/// Name of the column used to guess if vehicle is driving.
pub const SHIFT_STATE_COLUMN: &str = "shift_state";

/// Arguments of one subscribe attempt
#[derive(Clone, PartialEq, Eq)]
pub struct Subscription {
    /// vehicle tag, usually the vehicle id
    pub tag: String,
    /// oauth bearer token
    pub token: String,
    /// requested columns, no duplicates, order is wire order
    pub columns: Vec<String>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("tag", &self.tag)
            .field("token", &"<redacted>")
            .field("columns", &self.columns)
            .finish()
    }
}

impl Subscription {
    /// Create a subscription, `None` or empty columns means [`DEFAULT_COLUMNS`].
    ///
    /// Duplicated columns are dropped, only the first one is kept.
    pub fn new<T, K>(tag: T, token: K, columns: Option<Vec<String>>) -> Self
    where
        T: Into<String>,
        K: Into<String>,
    {
        let columns = match columns {
            Some(columns) if !columns.is_empty() => {
                let mut unique: Vec<String> = Vec::with_capacity(columns.len());
                for column in columns {
                    if unique.contains(&column) {
                        log::warn!("Duplicated column {} dropped", column);
                    } else {
                        unique.push(column);
                    }
                }
                unique
            }
            _ => DEFAULT_COLUMNS.iter().map(ToString::to_string).collect(),
        };

        Self {
            tag: tag.into(),
            token: token.into(),
            columns,
        }
    }

    /// Position of a column in a `data:update` value, the first field is timestamp.
    pub fn value_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column).map(|i| i + 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_subscription_default_columns() {
        let sub = Subscription::new("t", "k", None);
        assert_eq!(sub.columns.len(), 9);
        assert_eq!(sub.columns[0], "speed");
        assert_eq!(sub.value_index(SHIFT_STATE_COLUMN), Some(9));

        let sub = Subscription::new("t", "k", Some(vec![]));
        assert_eq!(sub.columns.len(), 9);
    }

    #[test]
    fn test_subscription_dedup_keep_order() {
        let columns = ["power", "speed", "power", "soc", "speed"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let sub = Subscription::new("t", "k", Some(columns));
        assert_eq!(sub.columns, vec!["power", "speed", "soc"]);
        assert_eq!(sub.value_index("speed"), Some(2));
        assert_eq!(sub.value_index(SHIFT_STATE_COLUMN), None);
    }
}
