mod class_list;
mod document_list;
mod item_list;

pub use class_list::ClassListView;
pub use document_list::DocumentListView;
pub use item_list::ItemListView;
