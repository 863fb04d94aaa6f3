pub mod crawl;
pub mod fetch;
pub mod frontier;
pub mod parse;
pub mod queue;
pub mod robots;
pub mod urlnorm;
