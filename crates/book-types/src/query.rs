use std::cmp::Ordering;
use std::str::FromStr;

use crate::Book;

// ============================================================================
// List query
// ============================================================================

/// Text columns a search can run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Title,
    Author,
}

impl TextField {
    pub fn column(&self) -> &'static str {
        match self {
            TextField::Title => "title",
            TextField::Author => "author",
        }
    }

    fn value<'a>(&self, book: &'a Book) -> &'a str {
        match self {
            TextField::Title => &book.title,
            TextField::Author => &book.author,
        }
    }
}

/// Case-insensitive substring match on one text column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSearch {
    pub field: TextField,
    pub value: String,
}

/// Keep only books whose column equals one of the listed values.
///
/// An empty list filters nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookFilter {
    Title(Vec<String>),
    Author(Vec<String>),
    Year(Vec<i32>),
}

impl BookFilter {
    fn matches(&self, book: &Book) -> bool {
        match self {
            BookFilter::Title(values) => values.is_empty() || values.contains(&book.title),
            BookFilter::Author(values) => values.is_empty() || values.contains(&book.author),
            BookFilter::Year(values) => values.is_empty() || values.contains(&book.year),
        }
    }
}

/// Inclusive year bounds, either side optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
    pub from: Option<i32>,
    pub to: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Author,
    Year,
    CreatedAt,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Author => "author",
            SortField::Year => "year",
            SortField::CreatedAt => "created_at",
        }
    }

    fn compare(&self, a: &Book, b: &Book) -> Ordering {
        match self {
            SortField::Title => a.title.cmp(&b.title),
            SortField::Author => a.author.cmp(&b.author),
            SortField::Year => a.year.cmp(&b.year),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "title" => Ok(SortField::Title),
            "author" => Ok(SortField::Author),
            "year" => Ok(SortField::Year),
            "created_at" => Ok(SortField::CreatedAt),
            other => Err(format!(
                "unknown sort field '{}' (expected title, author, year or created_at)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookSort {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Search, filter, sort and page a book table.
///
/// The default query returns every row in admission order. Rows that tie on
/// the sort field keep admission order too. Paging applies only when both
/// `page` (1-based) and `per_page` are positive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookListQuery {
    pub search: Option<BookSearch>,
    pub filters: Vec<BookFilter>,
    pub year_range: Option<YearRange>,
    pub sort: Option<BookSort>,
    pub page: u32,
    pub per_page: u32,
}

impl BookListQuery {
    /// Whether `book` passes the search, every filter and the year range
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(search) = &self.search {
            if !search.value.is_empty()
                && !search
                    .field
                    .value(book)
                    .to_lowercase()
                    .contains(&search.value.to_lowercase())
            {
                return false;
            }
        }

        if !self.filters.iter().all(|filter| filter.matches(book)) {
            return false;
        }

        if let Some(range) = self.year_range {
            if range.from.is_some_and(|from| book.year < from)
                || range.to.is_some_and(|to| book.year > to)
            {
                return false;
            }
        }
        true
    }

    /// Order two matching books. Equal means "keep admission order".
    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        match self.sort {
            Some(BookSort {
                field,
                direction: SortDirection::Asc,
            }) => field.compare(a, b),
            Some(BookSort {
                field,
                direction: SortDirection::Desc,
            }) => field.compare(b, a),
            None => Ordering::Equal,
        }
    }

    /// `(offset, limit)` when paging is requested
    pub fn page_bounds(&self) -> Option<(i64, i64)> {
        if self.page == 0 || self.per_page == 0 {
            return None;
        }
        let per_page = i64::from(self.per_page);
        Some(((i64::from(self.page) - 1) * per_page, per_page))
    }

    /// Apply the query to books already in admission order.
    pub fn apply(&self, books: impl IntoIterator<Item = Book>) -> Vec<Book> {
        let mut selected: Vec<Book> = books.into_iter().filter(|b| self.matches(b)).collect();
        // Stable, so ties stay in admission order
        selected.sort_by(|a, b| self.compare(a, b));

        match self.page_bounds() {
            Some((offset, limit)) => selected
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            None => selected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shelf() -> Vec<Book> {
        vec![
            Book::new("Dune", "Frank Herbert", 1965),
            Book::new("Hyperion", "Dan Simmons", 1989),
            Book::new("Dune Messiah", "Frank Herbert", 1969),
            Book::new("Neuromancer", "William Gibson", 1984),
            Book::new("Endymion", "Dan Simmons", 1996),
        ]
    }

    fn titles(books: Vec<Book>) -> Vec<String> {
        books.into_iter().map(|b| b.title).collect()
    }

    #[test]
    fn test_default_query_keeps_everything_in_order() {
        let query = BookListQuery::default();
        assert_eq!(titles(query.apply(shelf())), titles(shelf()));
        assert_eq!(query.page_bounds(), None);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let query = BookListQuery {
            search: Some(BookSearch {
                field: TextField::Title,
                value: "DUNE".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(titles(query.apply(shelf())), vec!["Dune", "Dune Messiah"]);
    }

    #[test]
    fn test_filters_and_range_combine() {
        let query = BookListQuery {
            filters: vec![
                BookFilter::Author(vec!["Dan Simmons".to_string(), "Frank Herbert".to_string()]),
                BookFilter::Year(vec![]),
            ],
            year_range: Some(YearRange {
                from: Some(1968),
                to: Some(1990),
            }),
            ..Default::default()
        };
        assert_eq!(titles(query.apply(shelf())), vec!["Hyperion", "Dune Messiah"]);
    }

    #[test]
    fn test_sort_desc_with_stable_ties_and_paging() {
        let query = BookListQuery {
            sort: Some(BookSort {
                field: SortField::Author,
                direction: SortDirection::Desc,
            }),
            page: 2,
            per_page: 2,
            ..Default::default()
        };
        // William Gibson, Frank Herbert x2, Dan Simmons x2; second page
        assert_eq!(titles(query.apply(shelf())), vec!["Dune Messiah", "Hyperion"]);
        assert_eq!(query.page_bounds(), Some((2, 2)));
    }

    #[test]
    fn test_sort_field_from_str() {
        assert_eq!("Year".parse::<SortField>(), Ok(SortField::Year));
        assert_eq!("created_at".parse::<SortField>(), Ok(SortField::CreatedAt));
        assert!("isbn".parse::<SortField>().is_err());
    }
}
