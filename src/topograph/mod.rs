pub mod graph;
pub mod net_util;
