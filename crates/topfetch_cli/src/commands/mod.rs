pub(crate) mod fetch;
pub(crate) mod login;
pub(crate) mod meta;
pub(crate) mod shared;
pub(crate) mod status;
