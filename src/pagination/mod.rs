//! Pagination module
//!
//! Supports: Next Token, Page Based, Offset And Limit, GraphQL Connections
//!
//! # Overview
//!
//! A data set declares a [`PagingScheme`]. [`create_paginator`] validates it
//! and returns a stateful [`Paginator`] that shapes each request
//! ([`Paginator::paginate_request`]) and decides from each response whether
//! another page exists ([`Paginator::next_page`]).

mod strategies;
mod types;

pub use strategies::{
    create_paginator, GraphqlPaginator, NextTokenPaginator, OffsetAndLimitPaginator,
    PageBasedPaginator,
};
pub use types::{
    append_query, extract_page_value, extract_simple_path, set_body_path,
    GraphqlConnectionsScheme, NextTokenScheme, OffsetAndLimitScheme, PageBasedScheme,
    PageResponse, PageState, PageUntil, PagedRequest, Paginator, PagingScheme, TokenType,
};

#[cfg(test)]
mod tests;
