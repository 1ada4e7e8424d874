mod codec;
mod config_validation;
mod domain_order;
mod domain_vote;
mod receipts;
mod time_limited;
