mod client;
mod key_pair;
mod login;

pub(crate) use client::user_agent;
pub use key_pair::wrap_private_key_pem;
pub(crate) use login::{get_base_url, login};
