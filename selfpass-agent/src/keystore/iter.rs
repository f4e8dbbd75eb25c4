use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter::FusedIterator;

use super::entry::{CredentialEntry, HostCredentials};

/// `(host, histories)` for every host, in host order. Single pass.
#[derive(Debug)]
pub struct Credentials<'a> {
    inner: btree_map::Iter<'a, String, HostCredentials>,
}

impl<'a> Credentials<'a> {
    pub(crate) fn new(hosts: &'a BTreeMap<String, HostCredentials>) -> Self {
        Self { inner: hosts.iter() }
    }
}

impl<'a> Iterator for Credentials<'a> {
    type Item = (&'a str, &'a HostCredentials);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(host, data)| (host.as_str(), data))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Credentials<'_> {}
impl FusedIterator for Credentials<'_> {}

/// `(host, username -> current entry)` for every host, in host order.
#[derive(Debug)]
pub struct CurrentCredentials<'a> {
    inner: btree_map::Iter<'a, String, HostCredentials>,
}

impl<'a> CurrentCredentials<'a> {
    pub(crate) fn new(hosts: &'a BTreeMap<String, HostCredentials>) -> Self {
        Self { inner: hosts.iter() }
    }
}

impl<'a> Iterator for CurrentCredentials<'a> {
    type Item = (&'a str, BTreeMap<&'a str, &'a CredentialEntry>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(host, data)| (host.as_str(), latest_per_user(data)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for CurrentCredentials<'_> {}
impl FusedIterator for CurrentCredentials<'_> {}

pub(crate) fn latest_per_user(data: &HostCredentials) -> BTreeMap<&str, &CredentialEntry> {
    data.iter()
        .filter_map(|(username, history)| history.last().map(|entry| (username.as_str(), entry)))
        .collect()
}
