use clap::Parser;

use crate::error::{AppError, AppResult};

use super::SockmeArgs;

pub(crate) fn parse_test_args<I, T>(args: I) -> AppResult<SockmeArgs>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    SockmeArgs::try_parse_from(args).map_err(AppError::from)
}
