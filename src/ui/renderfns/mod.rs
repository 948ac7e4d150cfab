pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, host_of};
pub use utils::{draw_alert, draw_placeholder, format_date, list_title, truncate};
