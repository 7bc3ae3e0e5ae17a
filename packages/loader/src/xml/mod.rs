//! XML utilities.

mod doctype;
mod utils;

pub use doctype::{find_doctype, Doctype};
pub use utils::{
    direct_text, element_children, get_tag_name, has_character_data, parse_document,
    parsing_options, text_position,
};
