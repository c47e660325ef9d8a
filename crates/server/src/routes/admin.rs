//! Platform administration (`/admin/*`).
//!
//! Every route here sits behind [`require_admin`](crate::middleware::require_admin).

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Redirect,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use suuq_core::{OrderId, OrderStatus, StoreId, UserId};

use crate::db::reports::{MonthlyRevenue, PaymentMethodCount, TopProduct};
use crate::db::{
    OrderRepository, Page, PageRequest, PaymentRepository, ProductRepository, ReportRepository,
    StoreRepository, UserRepository,
};
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{Order, OrderItem, OrderWithItems, Payment, Store, User};
use crate::state::AppState;

/// Recent users and orders on the overview.
const RECENT_LIMIT: i64 = 5;

/// Page links under a paged list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    pub page: u32,
    pub pages: i64,
    pub total: i64,
    pub previous: Option<u32>,
    pub next: Option<u32>,
    /// Extra query string kept on the links, `&`-prefixed.
    pub query: String,
}

impl Pager {
    #[must_use]
    pub fn new<T>(page: &Page<T>, query: String) -> Self {
        Self {
            page: page.page,
            pages: page.pages,
            total: page.total,
            previous: page.previous_page(),
            next: page.next_page(),
            query,
        }
    }
}

/// One entry of an order status select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOption {
    pub status: OrderStatus,
    pub selected: bool,
}

impl StatusOption {
    /// Every status, with `current` selected.
    #[must_use]
    pub fn all(current: Option<OrderStatus>) -> Vec<Self> {
        OrderStatus::ALL
            .iter()
            .map(|&status| Self {
                status,
                selected: current == Some(status),
            })
            .collect()
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/overview.html")]
pub struct OverviewTemplate {
    pub total_users: i64,
    pub total_stores: i64,
    pub total_products: i64,
    pub total_orders: i64,
    pub total_revenue: Decimal,
    pub recent_users: Vec<User>,
    /// The most recent orders.
    pub orders: Vec<Order>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub users: Vec<User>,
    pub pager: Pager,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/stores.html")]
pub struct StoresTemplate {
    pub stores: Vec<Store>,
    pub pager: Pager,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/orders.html")]
pub struct OrdersTemplate {
    pub orders: Vec<Order>,
    pub status_options: Vec<StatusOption>,
    pub pager: Pager,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/order_detail.html")]
pub struct OrderDetailTemplate {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    pub status_options: Vec<StatusOption>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/payments.html")]
pub struct PaymentsTemplate {
    pub payments: Vec<Payment>,
    pub pager: Pager,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/reports.html")]
pub struct ReportsTemplate {
    pub revenue_by_month: Vec<MonthlyRevenue>,
    pub top_products: Vec<TopProduct>,
    pub payment_methods: Vec<PaymentMethodCount>,
}

/// `?page=&status=` on the order list. An empty status means "all".
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OrderFilter {
    pub page: Option<u32>,
    pub status: Option<String>,
}

/// Order status form data.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.trim()
        .parse()
        .map_err(|err: suuq_core::ParseStatusError| AppError::BadRequest(err.to_string()))
}

/// Admin overview.
#[instrument(skip_all)]
pub async fn overview(State(state): State<AppState>) -> Result<OverviewTemplate> {
    let pool = state.pool();
    let users = UserRepository::new(pool);
    let orders = OrderRepository::new(pool);

    Ok(OverviewTemplate {
        total_users: users.count().await?,
        total_stores: StoreRepository::new(pool).count().await?,
        total_products: ProductRepository::new(pool).count().await?,
        total_orders: orders.count().await?,
        total_revenue: orders.revenue().await?,
        recent_users: users.recent(RECENT_LIMIT).await?,
        orders: orders.recent(RECENT_LIMIT).await?,
    })
}

/// All users, 20 per page.
#[instrument(skip(state))]
pub async fn users(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<UsersTemplate> {
    let page = UserRepository::new(state.pool()).list(page).await?;
    Ok(UsersTemplate {
        pager: Pager::new(&page, String::new()),
        users: page.items,
    })
}

/// Activate or deactivate a user. Admins cannot deactivate themselves.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn toggle_user(
    State(state): State<AppState>,
    RequireUser(admin): RequireUser,
    Path(user_id): Path<UserId>,
) -> Result<Redirect> {
    if user_id == admin.id {
        return Err(AppError::BadRequest(
            "you cannot deactivate your own account".to_owned(),
        ));
    }
    let user = UserRepository::new(state.pool())
        .toggle_active(user_id)
        .await?;
    tracing::info!(%user_id, is_active = user.is_active, "user status changed");
    Ok(Redirect::to("/admin/users"))
}

/// Grant administrator rights.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn make_admin(
    State(state): State<AppState>,
    RequireUser(admin): RequireUser,
    Path(user_id): Path<UserId>,
) -> Result<Redirect> {
    UserRepository::new(state.pool())
        .set_admin(user_id, true)
        .await?;
    tracing::info!(%user_id, "user promoted to admin");
    Ok(Redirect::to("/admin/users"))
}

/// All stores, 20 per page.
#[instrument(skip(state))]
pub async fn stores(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<StoresTemplate> {
    let page = StoreRepository::new(state.pool()).list(page).await?;
    Ok(StoresTemplate {
        pager: Pager::new(&page, String::new()),
        stores: page.items,
    })
}

/// Activate or deactivate a store.
#[instrument(skip(state))]
pub async fn toggle_store(
    State(state): State<AppState>,
    Path(store_id): Path<StoreId>,
) -> Result<Redirect> {
    let store = StoreRepository::new(state.pool())
        .toggle_active(store_id)
        .await?;
    tracing::info!(%store_id, is_active = store.is_active, "store status changed");
    Ok(Redirect::to("/admin/stores"))
}

/// Orders, newest first, optionally filtered by status.
#[instrument(skip(state))]
pub async fn orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Result<OrdersTemplate> {
    let status_filter = filter
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_status)
        .transpose()?;
    let request = PageRequest {
        page: filter.page.unwrap_or(1),
    };

    let page = OrderRepository::new(state.pool())
        .list(request, status_filter)
        .await?;
    let query = status_filter.map_or_else(String::new, |status| format!("&status={status}"));
    Ok(OrdersTemplate {
        pager: Pager::new(&page, query),
        orders: page.items,
        status_options: StatusOption::all(status_filter),
    })
}

/// One order with its lines and payment attempts.
#[instrument(skip(state))]
pub async fn order_detail(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<OrderDetailTemplate> {
    let OrderWithItems {
        order,
        items,
        payments,
    } = OrderRepository::new(state.pool())
        .get_with_details(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    Ok(OrderDetailTemplate {
        status_options: StatusOption::all(Some(order.status)),
        order,
        items,
        payments,
    })
}

/// Set an order's status.
#[instrument(skip(state, form))]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let status = parse_status(&form.status)?;
    let order = OrderRepository::new(state.pool())
        .update_status(order_id, status)
        .await?;
    tracing::info!(%order_id, order_number = %order.order_number, %status, "order status updated");
    Ok(Redirect::to(&format!("/admin/orders/{order_id}")))
}

/// Payments, newest first.
#[instrument(skip(state))]
pub async fn payments(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<PaymentsTemplate> {
    let page = PaymentRepository::new(state.pool()).list(page).await?;
    Ok(PaymentsTemplate {
        pager: Pager::new(&page, String::new()),
        payments: page.items,
    })
}

/// Revenue by month, best sellers and payment method usage.
#[instrument(skip_all)]
pub async fn reports(State(state): State<AppState>) -> Result<ReportsTemplate> {
    let reports = ReportRepository::new(state.pool());
    Ok(ReportsTemplate {
        revenue_by_month: reports.revenue_by_month().await?,
        top_products: reports.top_products().await?,
        payment_methods: reports.payment_methods().await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert!(matches!(parse_status(" shipped "), Ok(OrderStatus::Shipped)));
        for status in OrderStatus::ALL {
            assert_eq!(parse_status(status.as_str()).ok(), Some(*status));
        }
        assert!(matches!(parse_status("refunded"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_pager_keeps_filter() {
        let page = Page::new(vec![1, 2], PageRequest { page: 2 }, 45);
        let pager = Pager::new(&page, "&status=paid".to_owned());
        assert_eq!(pager.page, 2);
        assert_eq!(pager.pages, 3);
        assert_eq!(pager.total, 45);
        assert_eq!(pager.previous, Some(1));
        assert_eq!(pager.next, Some(3));
        assert_eq!(pager.query, "&status=paid");
    }

    #[test]
    fn test_status_options() {
        let options = StatusOption::all(Some(OrderStatus::Shipped));
        assert_eq!(options.len(), OrderStatus::ALL.len());
        let selected: Vec<_> = options.iter().filter(|o| o.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].status, OrderStatus::Shipped);

        assert!(StatusOption::all(None).iter().all(|o| !o.selected));
    }
}
