mod common;
mod governance;
mod routing;
