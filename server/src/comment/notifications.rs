use std::collections::BTreeSet;

use lessonroom_core::{
    comment::CommentThreadRecord,
    document::DocumentRecord,
    identity::UserProfile,
    ids::UserId,
    notification::ActivityData,
};

use crate::notification::{DispatchOutcome, NotificationDispatcher};

/// A new thread notifies the document creator.
pub async fn notify_comment_creation(
    dispatcher: &NotificationDispatcher,
    author: &UserProfile,
    document: &DocumentRecord,
    thread: &CommentThreadRecord,
) -> Vec<DispatchOutcome> {
    let mut notify_ids = BTreeSet::new();
    notify_ids.insert(document.creator_id().clone());

    dispatch(dispatcher, author, document, thread, &notify_ids).await
}

/// A reply notifies the creator plus everyone who took part in the thread.
/// The reply's own author is skipped at dispatch.
pub async fn notify_comment_reply(
    dispatcher: &NotificationDispatcher,
    author: &UserProfile,
    document: &DocumentRecord,
    thread: &CommentThreadRecord,
) -> Vec<DispatchOutcome> {
    let mut notify_ids = BTreeSet::new();
    notify_ids.insert(document.creator_id().clone());
    notify_ids.extend(thread.participants());

    dispatch(dispatcher, author, document, thread, &notify_ids).await
}

fn comment_activity(
    author: &UserProfile,
    document: &DocumentRecord,
    thread: &CommentThreadRecord,
) -> ActivityData {
    ActivityData {
        user_name: Some(author.name.clone()),
        user_avatar: Some(author.avatar.clone()),
        user_email: Some(author.email.clone()),
        document_title: Some(document.title().to_owned()),
        bloq_id: Some(thread.metadata.bloq_id.to_string()),
        thread_id: Some(thread.id.to_string()),
        ..ActivityData::default()
    }
}

async fn dispatch(
    dispatcher: &NotificationDispatcher,
    author: &UserProfile,
    document: &DocumentRecord,
    thread: &CommentThreadRecord,
    notify_ids: &BTreeSet<UserId>,
) -> Vec<DispatchOutcome> {
    let mut outcomes = Vec::new();
    for recipient in notify_ids.iter().filter(|id| **id != author.id) {
        let outcome = dispatcher
            .notify_comment(
                recipient,
                &author.id,
                &document.id,
                comment_activity(author, document, thread),
            )
            .await;
        outcomes.push(outcome);
    }
    outcomes
}
