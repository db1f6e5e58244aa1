pub(crate) mod banner;
pub(crate) mod summary_output;

pub(crate) use banner::print_banner;
pub(crate) use summary_output::print_summary;
