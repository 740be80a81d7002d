//! Connection resolver: cursor-bounded pages of message edges, newest
//! first, with probe-based page-existence flags.

use palaver_core::{
    Connection, Cursor, Edge, EntityKind, Error, GroupId, MessageId, PageArgs, PageInfo,
};

use crate::store::Store;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Resolves one page of `group_id`'s history.
///
/// `after` restricts to messages older than its decoded id (`id < after`),
/// `before` to newer ones (`id > before`); the feed is newest-first, so
/// "after" in display order means a smaller identifier. Mixing the forward
/// and backward argument pairs is accepted and simply applies both bounds.
pub async fn page(
    store: &dyn Store,
    group_id: GroupId,
    args: &PageArgs,
) -> Result<Connection, Error> {
    if store.group(group_id).await?.is_none() {
        return Err(Error::not_found(EntityKind::Group, group_id.0));
    }

    let older_than = decode_bound(args.after.as_deref())?;
    let newer_than = decode_bound(args.before.as_deref())?;
    let limit = args
        .first
        .or(args.last)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE) as usize;

    let rows = store
        .messages_page(group_id, older_than, newer_than, limit)
        .await?;

    // A short page proves there is nothing older; a full one needs a probe
    // below the last returned row, under the same bound predicate.
    let has_next_page = if rows.len() < limit {
        false
    } else {
        match rows.last() {
            Some(last) => {
                store
                    .older_message_exists(group_id, last.id, newer_than)
                    .await?
            }
            None => false,
        }
    };

    // The previous-page probe compares against the applied boundary cursor,
    // not the first returned edge: it answers "is there anything beyond the
    // cursor", which is the historical contract clients rely on. Without a
    // cursor the page starts at the newest message and the answer is no.
    let has_previous_page = match older_than {
        Some(bound) => store.newer_message_exists(group_id, bound).await?,
        None => false,
    };

    let edges = rows
        .into_iter()
        .map(|node| Edge {
            cursor: Cursor::encode(node.id),
            node,
        })
        .collect();

    Ok(Connection {
        edges,
        page_info: PageInfo {
            has_next_page,
            has_previous_page,
        },
    })
}

fn decode_bound(raw: Option<&str>) -> Result<Option<MessageId>, Error> {
    raw.map(Cursor::decode).transpose().map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use palaver_core::UserId;

    /// Group whose messages carry ids 5..=10 (a sibling group soaks up the
    /// lower ids), mirroring the canonical pagination walkthrough.
    async fn store_with_ids_five_to_ten() -> (MemoryStore, GroupId, UserId) {
        let store = MemoryStore::new();
        let user = store
            .create_user("ana", "ana@example.com", "h")
            .await
            .unwrap();
        let filler = store.create_group("filler", user.id, &[]).await.unwrap();
        for n in 0..4 {
            store
                .create_message(filler.id, user.id, &format!("filler {n}"))
                .await
                .unwrap();
        }
        let group = store.create_group("main", user.id, &[]).await.unwrap();
        for n in 0..6 {
            store
                .create_message(group.id, user.id, &format!("msg {n}"))
                .await
                .unwrap();
        }
        (store, group.id, user.id)
    }

    fn ids(connection: &Connection) -> Vec<i64> {
        connection.edges.iter().map(|e| e.node.id.0).collect()
    }

    #[tokio::test]
    async fn first_page_is_newest_first_with_next_page() {
        let (store, group, _) = store_with_ids_five_to_ten().await;
        let connection = page(&store, group, &PageArgs::first(3)).await.unwrap();

        assert_eq!(ids(&connection), vec![10, 9, 8]);
        assert!(connection.page_info.has_next_page);
        assert!(!connection.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn after_cursor_returns_the_older_tail() {
        let (store, group, _) = store_with_ids_five_to_ten().await;
        let args = PageArgs::first(3).after(Cursor::encode(MessageId(8)).as_str());
        let connection = page(&store, group, &args).await.unwrap();

        assert_eq!(ids(&connection), vec![7, 6, 5]);
        assert!(!connection.page_info.has_next_page);
    }

    #[tokio::test]
    async fn bounds_hold_and_order_is_strictly_descending() {
        let (store, group, _) = store_with_ids_five_to_ten().await;
        let args = PageArgs::first(10).after(Cursor::encode(MessageId(9)).as_str());
        let connection = page(&store, group, &args).await.unwrap();

        let got = ids(&connection);
        assert!(got.iter().all(|&id| id < 9));
        assert!(got.windows(2).all(|w| w[0] > w[1]));
    }

    #[tokio::test]
    async fn short_page_means_no_next_page() {
        let (store, group, _) = store_with_ids_five_to_ten().await;
        let connection = page(&store, group, &PageArgs::first(50)).await.unwrap();

        assert_eq!(connection.edges.len(), 6);
        assert!(!connection.page_info.has_next_page);
    }

    #[tokio::test]
    async fn backward_args_apply_the_newer_bound() {
        let (store, group, _) = store_with_ids_five_to_ten().await;
        let args = PageArgs {
            last: Some(2),
            before: Some(Cursor::encode(MessageId(7)).as_str().to_string()),
            ..Default::default()
        };
        let connection = page(&store, group, &args).await.unwrap();

        assert_eq!(ids(&connection), vec![10, 9]);
        assert!(connection.page_info.has_next_page);
    }

    #[tokio::test]
    async fn has_previous_page_probes_boundary_not_first_edge() {
        let (store, group, _) = store_with_ids_five_to_ten().await;

        // after=10 returns 9,8,... and the probe asks "anything newer than
        // 10" (the boundary), not "newer than 9" (the first edge). Id 10
        // itself does not count; only ids above the boundary would.
        let args = PageArgs::first(2).after(Cursor::encode(MessageId(10)).as_str());
        let connection = page(&store, group, &args).await.unwrap();
        assert_eq!(ids(&connection), vec![9, 8]);
        assert!(!connection.page_info.has_previous_page);

        // A boundary below the newest message does report a previous page.
        let args = PageArgs::first(2).after(Cursor::encode(MessageId(8)).as_str());
        let connection = page(&store, group, &args).await.unwrap();
        assert!(connection.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn extreme_cursor_values_do_not_break_the_probes() {
        let (store, group, _) = store_with_ids_five_to_ten().await;

        // A well-formed cursor may carry any i64; the previous-page probe
        // must handle the extremes without wrapping.
        let args = PageArgs::first(3).after(Cursor::encode(MessageId(i64::MAX)).as_str());
        let connection = page(&store, group, &args).await.unwrap();
        assert_eq!(ids(&connection), vec![10, 9, 8]);
        assert!(!connection.page_info.has_previous_page);

        let args = PageArgs::first(3).after(Cursor::encode(MessageId(i64::MIN)).as_str());
        let connection = page(&store, group, &args).await.unwrap();
        assert!(connection.edges.is_empty());
        assert!(connection.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected_without_side_effects() {
        let (store, group, _) = store_with_ids_five_to_ten().await;
        let args = PageArgs::first(3).after("%%%not-a-cursor%%%");
        let err = page(&store, group, &args).await.unwrap_err();
        assert!(matches!(err, Error::MalformedCursor));
    }

    #[tokio::test]
    async fn unknown_group_is_not_found_but_empty_group_is_fine() {
        let (store, _, user) = store_with_ids_five_to_ten().await;

        let err = page(&store, GroupId(404), &PageArgs::first(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let quiet = store.create_group("quiet", user, &[]).await.unwrap();
        let connection = page(&store, quiet.id, &PageArgs::first(3)).await.unwrap();
        assert!(connection.edges.is_empty());
        assert!(!connection.page_info.has_next_page);
        assert!(!connection.page_info.has_previous_page);
    }
}
