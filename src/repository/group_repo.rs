//! Group repository (权限图数据访问)

use super::GroupStore;
use crate::{
    error::GraphResult,
    graph::Group,
    models::{
        ActionLogEntry, GrantRow, GraphSnapshot, GroupId, GroupLink, GroupRow, Invitation,
        InvitationRow, LinkId, LinkRow, MembershipRow, MergeRow, Permission, PermissionId,
        PermissionRow, Rank, RankId, RankRow,
    },
};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub struct GroupRepository {
    db: PgPool,
}

impl GroupRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GroupStore for GroupRepository {
    // ==================== Snapshot ====================

    /// 在一个事务中读取全部行，保证快照内部一致
    async fn load_snapshot(&self) -> GraphResult<GraphSnapshot> {
        let mut tx = self.db.begin().await?;

        let permissions = sqlx::query_as::<_, PermissionRow>(
            "SELECT perm_id, name FROM permissions ORDER BY perm_id",
        )
        .fetch_all(&mut *tx)
        .await?;

        let groups = sqlx::query_as::<_, GroupRow>(
            "SELECT group_id, group_name, meta_data FROM graph_groups ORDER BY group_id",
        )
        .fetch_all(&mut *tx)
        .await?;

        let ranks = sqlx::query_as::<_, RankRow>(
            r#"
            SELECT group_id, rank_id, rank_name, parent_rank_id
            FROM group_ranks
            ORDER BY group_id, rank_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let memberships = sqlx::query_as::<_, MembershipRow>(
            "SELECT group_id, member_id, rank_id FROM group_members ORDER BY group_id",
        )
        .fetch_all(&mut *tx)
        .await?;

        let grants = sqlx::query_as::<_, GrantRow>(
            "SELECT group_id, rank_id, perm_id FROM rank_permissions ORDER BY group_id, rank_id",
        )
        .fetch_all(&mut *tx)
        .await?;

        let merges = sqlx::query_as::<_, MergeRow>(
            "SELECT old_group, new_group FROM merged_groups ORDER BY old_group",
        )
        .fetch_all(&mut *tx)
        .await?;

        let links = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT link_id, origin_group_id, origin_rank_id, target_group_id, target_rank_id
            FROM group_links
            ORDER BY link_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let invitations = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT member_id, group_id, rank_id, invited_at
            FROM group_invitations
            ORDER BY group_id, invited_at
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let snapshot = GraphSnapshot {
            permissions,
            groups,
            ranks,
            memberships,
            grants,
            merges,
            links,
            invitations,
        };
        tracing::debug!(rows = snapshot.row_count(), "Graph snapshot loaded");
        Ok(snapshot)
    }

    // ==================== Permissions ====================

    async fn insert_permission(&self, permission: &Permission) -> GraphResult<()> {
        sqlx::query("INSERT INTO permissions (perm_id, name) VALUES ($1, $2)")
            .bind(permission.id)
            .bind(&permission.name)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ==================== Groups ====================

    /// 写入组、全部 rank 与初始成员
    async fn insert_group(&self, group: &Group) -> GraphResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("INSERT INTO graph_groups (group_id, group_name, meta_data) VALUES ($1, $2, $3)")
            .bind(group.id())
            .bind(group.name())
            .bind(group.metadata())
            .execute(&mut *tx)
            .await?;

        for rank in group.ranks().iter() {
            sqlx::query(
                r#"
                INSERT INTO group_ranks (group_id, rank_id, rank_name, parent_rank_id)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(group.id())
            .bind(rank.id)
            .bind(&rank.name)
            .bind(rank.parent)
            .execute(&mut *tx)
            .await?;

            for permission in &rank.permissions {
                sqlx::query(
                    "INSERT INTO rank_permissions (group_id, rank_id, perm_id) VALUES ($1, $2, $3)",
                )
                .bind(group.id())
                .bind(rank.id)
                .bind(permission)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (principal, rank) in group.members() {
            sqlx::query("INSERT INTO group_members (group_id, member_id, rank_id) VALUES ($1, $2, $3)")
                .bind(group.id())
                .bind(principal)
                .bind(rank)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn rename_group(&self, group: GroupId, name: &str) -> GraphResult<()> {
        sqlx::query("UPDATE graph_groups SET group_name = $2 WHERE group_id = $1")
            .bind(group)
            .bind(name)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_metadata(&self, group: GroupId, metadata: &serde_json::Value) -> GraphResult<()> {
        sqlx::query("UPDATE graph_groups SET meta_data = $2 WHERE group_id = $1")
            .bind(group)
            .bind(metadata)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// 合并：改写旧映射、追加新映射并删除被合并组（其 rank、成员、授权与邀请级联删除）
    async fn merge_groups(&self, survivor: GroupId, merged: GroupId) -> GraphResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE merged_groups SET new_group = $1 WHERE new_group = $2")
            .bind(survivor)
            .bind(merged)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO merged_groups (old_group, new_group)
            VALUES ($1, $2)
            ON CONFLICT (old_group) DO UPDATE SET new_group = EXCLUDED.new_group
            "#,
        )
        .bind(merged)
        .bind(survivor)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM graph_groups WHERE group_id = $1")
            .bind(merged)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Ranks ====================

    async fn insert_rank(&self, group: GroupId, rank: &Rank) -> GraphResult<()> {
        sqlx::query(
            r#"
            INSERT INTO group_ranks (group_id, rank_id, rank_name, parent_rank_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(group)
        .bind(rank.id)
        .bind(&rank.name)
        .bind(rank.parent)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_rank(&self, group: GroupId, rank: RankId) -> GraphResult<()> {
        sqlx::query("DELETE FROM group_ranks WHERE group_id = $1 AND rank_id = $2")
            .bind(group)
            .bind(rank)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn rename_rank(&self, group: GroupId, rank: RankId, name: &str) -> GraphResult<()> {
        sqlx::query("UPDATE group_ranks SET rank_name = $3 WHERE group_id = $1 AND rank_id = $2")
            .bind(group)
            .bind(rank)
            .bind(name)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn move_rank(&self, group: GroupId, rank: RankId, parent: RankId) -> GraphResult<()> {
        sqlx::query(
            "UPDATE group_ranks SET parent_rank_id = $3 WHERE group_id = $1 AND rank_id = $2",
        )
        .bind(group)
        .bind(rank)
        .bind(parent)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn insert_grant(
        &self,
        group: GroupId,
        rank: RankId,
        permission: PermissionId,
    ) -> GraphResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rank_permissions (group_id, rank_id, perm_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group)
        .bind(rank)
        .bind(permission)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_grant(
        &self,
        group: GroupId,
        rank: RankId,
        permission: PermissionId,
    ) -> GraphResult<()> {
        sqlx::query(
            "DELETE FROM rank_permissions WHERE group_id = $1 AND rank_id = $2 AND perm_id = $3",
        )
        .bind(group)
        .bind(rank)
        .bind(permission)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    // ==================== Members ====================

    async fn insert_member(&self, group: GroupId, principal: Uuid, rank: RankId) -> GraphResult<()> {
        sqlx::query("INSERT INTO group_members (group_id, member_id, rank_id) VALUES ($1, $2, $3)")
            .bind(group)
            .bind(principal)
            .bind(rank)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_member(&self, group: GroupId, principal: Uuid, rank: RankId) -> GraphResult<()> {
        sqlx::query("UPDATE group_members SET rank_id = $3 WHERE group_id = $1 AND member_id = $2")
            .bind(group)
            .bind(principal)
            .bind(rank)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_member(&self, group: GroupId, principal: Uuid) -> GraphResult<()> {
        sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND member_id = $2")
            .bind(group)
            .bind(principal)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ==================== Invitations ====================

    async fn upsert_invitation(&self, invitation: &Invitation) -> GraphResult<()> {
        sqlx::query(
            r#"
            INSERT INTO group_invitations (member_id, group_id, rank_id, invited_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id, member_id)
            DO UPDATE SET rank_id = EXCLUDED.rank_id, invited_at = EXCLUDED.invited_at
            "#,
        )
        .bind(invitation.principal)
        .bind(invitation.group)
        .bind(invitation.rank)
        .bind(invitation.invited_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_invitation(&self, group: GroupId, principal: Uuid) -> GraphResult<()> {
        sqlx::query("DELETE FROM group_invitations WHERE group_id = $1 AND member_id = $2")
            .bind(group)
            .bind(principal)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ==================== Links ====================

    async fn insert_link(&self, link: &GroupLink) -> GraphResult<()> {
        sqlx::query(
            r#"
            INSERT INTO group_links
                (link_id, origin_group_id, origin_rank_id, target_group_id, target_rank_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(link.id)
        .bind(link.origin.group)
        .bind(link.origin.rank)
        .bind(link.target.group)
        .bind(link.target.rank)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_link(&self, link: LinkId) -> GraphResult<()> {
        sqlx::query("DELETE FROM group_links WHERE link_id = $1")
            .bind(link)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ==================== Action log ====================

    async fn record_action(&self, entry: &ActionLogEntry) -> GraphResult<()> {
        sqlx::query(
            r#"
            INSERT INTO group_action_log
                (group_id, actor_id, action, rank_name, subject, extra, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.group_id)
        .bind(entry.actor)
        .bind(entry.action.as_str())
        .bind(&entry.rank)
        .bind(&entry.subject)
        .bind(&entry.extra)
        .bind(entry.occurred_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
