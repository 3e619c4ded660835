pub mod chrome;
pub mod html;

pub use chrome::{ChromeElement, ChromePageSurface};
pub use html::{HtmlElement, HtmlPageSurface, Interaction};
