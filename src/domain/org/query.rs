//! Query and option types for organization reads

use std::str::FromStr;

use super::entity::UserId;
use crate::domain::DomainError;

/// 1-based page selection
///
/// A non-positive page or page size disables paging and every matching row is
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// No LIMIT/OFFSET
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_paged(&self) -> bool {
        self.page > 0 && self.page_size > 0
    }

    /// `(limit, offset)` when paging is enabled
    ///
    /// The offset saturates, so a page far past the end selects nothing.
    pub fn limit_offset(&self) -> Option<(i64, i64)> {
        if self.is_paged() {
            Some((self.page_size, (self.page - 1).saturating_mul(self.page_size)))
        } else {
            None
        }
    }

    /// Applies the page window to an already ordered list
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        match self.limit_offset() {
            Some((limit, offset)) => items
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListOrgMembersOptions {
    /// Maximum number of members to return, 0 for all
    pub limit: usize,
}

impl ListOrgMembersOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOrgsOptions {
    /// Only organizations this user belongs to
    pub member_id: UserId,
    /// Also count memberships hidden from the user's profile
    pub include_private_members: bool,
}

impl ListOrgsOptions {
    pub fn new(member_id: UserId) -> Self {
        Self {
            member_id,
            include_private_members: false,
        }
    }

    pub fn with_private_members(mut self) -> Self {
        self.include_private_members = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessibleRepositoriesOptions {
    /// Skip the count query; the returned total is then always 0
    pub skip_count: bool,
}

/// Orderings accepted for organization search
///
/// Callers turn untrusted sort parameters into one of these through
/// [`FromStr`]; anything else is rejected before it reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgOrderBy {
    IdAsc,
    IdDesc,
    NameAsc,
    NameDesc,
    CreatedAsc,
    CreatedDesc,
    UpdatedDesc,
}

impl OrgOrderBy {
    /// SQL ORDER BY clause against the identity table
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::IdAsc => "id ASC",
            Self::IdDesc => "id DESC",
            Self::NameAsc => "lower_name ASC",
            Self::NameDesc => "lower_name DESC",
            Self::CreatedAsc => "created_at ASC, id ASC",
            Self::CreatedDesc => "created_at DESC, id DESC",
            Self::UpdatedDesc => "updated_at DESC, id DESC",
        }
    }
}

impl FromStr for OrgOrderBy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.to_lowercase().as_str() {
            "id" | "id asc" | "oldest" => Ok(Self::IdAsc),
            "id desc" | "newest" => Ok(Self::IdDesc),
            "name" | "name asc" | "alphabetically" => Ok(Self::NameAsc),
            "name desc" | "reversealphabetically" => Ok(Self::NameDesc),
            "created_at asc" => Ok(Self::CreatedAsc),
            "created_at desc" => Ok(Self::CreatedDesc),
            "updated_at desc" | "recentupdate" => Ok(Self::UpdatedDesc),
            _ => Err(DomainError::invalid_argument(format!(
                "Unsupported organization ordering '{}'",
                s
            ))),
        }
    }
}

/// Case-insensitive organization search
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchOrgsQuery {
    pub keyword: String,
    pub pagination: Pagination,
    /// `None` leaves the order to storage
    pub order_by: Option<OrgOrderBy>,
}

impl SearchOrgsQuery {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page: i64, page_size: i64) -> Self {
        self.pagination = Pagination::new(page, page_size);
        self
    }

    pub fn with_order(mut self, order_by: OrgOrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    /// Lowercased keyword with LIKE wildcards escaped, wrapped in `%`
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.keyword.len() + 2);
        pattern.push('%');

        for c in self.keyword.to_lowercase().chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }

        pattern.push('%');
        pattern
    }

    /// Whether a name or full name matches the keyword
    pub fn matches(&self, name: &str, full_name: &str) -> bool {
        let keyword = self.keyword.to_lowercase();
        name.to_lowercase().contains(&keyword) || full_name.to_lowercase().contains(&keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_limit_offset() {
        assert_eq!(Pagination::new(1, 10).limit_offset(), Some((10, 0)));
        assert_eq!(Pagination::new(3, 20).limit_offset(), Some((20, 40)));
    }

    #[test]
    fn test_pagination_disabled() {
        assert_eq!(Pagination::all().limit_offset(), None);
        assert_eq!(Pagination::new(1, 0).limit_offset(), None);
        assert_eq!(Pagination::new(2, -5).limit_offset(), None);
        assert_eq!(Pagination::new(0, 10).limit_offset(), None);
    }

    #[test]
    fn test_pagination_offset_saturates() {
        assert_eq!(
            Pagination::new(i64::MAX, 10).limit_offset(),
            Some((10, i64::MAX))
        );
        assert_eq!(
            Pagination::new(i64::MAX / 2, 4).limit_offset(),
            Some((4, i64::MAX))
        );
        assert!(Pagination::new(i64::MAX, 10).apply(vec![1, 2, 3]).is_empty());
    }

    #[test]
    fn test_pagination_apply() {
        let items: Vec<i32> = (1..=7).collect();

        assert_eq!(Pagination::new(2, 3).apply(items.clone()), vec![4, 5, 6]);
        assert_eq!(Pagination::new(3, 3).apply(items.clone()), vec![7]);
        assert!(Pagination::new(4, 3).apply(items.clone()).is_empty());
        assert_eq!(Pagination::new(1, -1).apply(items.clone()), items);
    }

    #[test]
    fn test_order_by_parsing() {
        assert_eq!("id ASC".parse::<OrgOrderBy>().unwrap(), OrgOrderBy::IdAsc);
        assert_eq!("id  desc".parse::<OrgOrderBy>().unwrap(), OrgOrderBy::IdDesc);
        assert_eq!(
            "recentupdate".parse::<OrgOrderBy>().unwrap(),
            OrgOrderBy::UpdatedDesc
        );
        assert!("id; DROP TABLE users".parse::<OrgOrderBy>().is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        let query = SearchOrgsQuery::new("A_c%");
        assert_eq!(query.like_pattern(), "%a\\_c\\%%");
    }

    #[test]
    fn test_search_matches_name_or_full_name() {
        let query = SearchOrgsQuery::new("ACM");
        assert!(query.matches("acme", ""));
        assert!(query.matches("other", "The Acme Corp"));
        assert!(!query.matches("globex", "Globex Inc"));
    }

    #[test]
    fn test_list_orgs_options() {
        let opts = ListOrgsOptions::new(UserId::new(5));
        assert!(!opts.include_private_members);
        assert!(opts.with_private_members().include_private_members);
    }
}
