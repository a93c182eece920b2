pub mod check;
pub mod dataflow;
pub mod ir;
pub mod line_names;
pub mod points_to;
