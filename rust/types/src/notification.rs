use crate::ids::CollectionUuid;

/// The catalog mutation that caused a notification to be enqueued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationType {
    CreateCollection,
    UpdateCollection,
    DeleteCollection,
    CreateDatabase,
    DeleteDatabase,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationType::CreateCollection => "CreateCollection",
            NotificationType::UpdateCollection => "UpdateCollection",
            NotificationType::DeleteCollection => "DeleteCollection",
            NotificationType::CreateDatabase => "CreateDatabase",
            NotificationType::DeleteDatabase => "DeleteDatabase",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CreateCollection" => Ok(NotificationType::CreateCollection),
            "UpdateCollection" => Ok(NotificationType::UpdateCollection),
            "DeleteCollection" => Ok(NotificationType::DeleteCollection),
            "CreateDatabase" => Ok(NotificationType::CreateDatabase),
            "DeleteDatabase" => Ok(NotificationType::DeleteDatabase),
            other => Err(format!("unrecognized notification type: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationStatus {
    Pending,
    Sent,
}

/// A durable record of a catalog mutation, enqueued in the same transaction
/// as the mutation that caused it (I5) and delivered to the notification
/// sink at least once, in per-collection FIFO order.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub collection_id: CollectionUuid,
    pub r#type: NotificationType,
    pub status: NotificationStatus,
}
