/// The set query language.
///
/// A query is a whitespace-separated list of *columns*; each column is a
/// selection over the registered sets, and the columns are combined by
/// Cartesian multiplication and intersection:
///
/// ```text
/// intersectionQuery = selectionQuery (WS selectionQuery)*
/// selectionQuery    = primary? multiplyAttr* filterAttr*
/// primary           = "#" id | type
/// multiplyAttr      = "[" attrList "]"
/// filterAttr        = "(" attrList ")"
/// attrList          = attr ("," attr)*
/// attr              = "#" id | name ("=" value)?
/// ```
///
/// `#performance` selects one set by id; `assessment` selects by type;
/// `[modelId=a-1,modelId=a-2]` multiplies the column into one selection
/// per attribute; `(isComplete)` is retained and applied to the
/// intersected result, not the selection. `"#a-300 #performance"` is the
/// performance set restricted to article `a-300`.
///
/// [`parser`] turns query text into columns, [`attrs`] owns the closed
/// attribute match-rule table, and [`eval`] runs selection,
/// multiplication, the intersection fold, and the filter pass.
pub mod attrs;
pub mod eval;
pub mod parser;

pub use attrs::match_attr;
pub use eval::{get_subset_by_path, get_subset_by_query, get_subsets_by_query};
pub use parser::{parse_query, Attr, Primary, QueryColumn};
