//! End-to-end tests for `NetworkService` over the in-memory store.
//!
//! These exercise the full control flow: access policy first, then the
//! hierarchy validator, then persistence, then level resolution for the
//! response.

use std::sync::Arc;

use rust_decimal::Decimal;
use supplynet::{
    AccessDenied, Employee, HierarchyError, MemoryStore, NetworkError, NetworkNodeUpdate,
    NetworkService, NewEmployee, NewNetworkNode, NewProduct, NodeType, Operation, Principal,
};
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn service() -> NetworkService<MemoryStore> {
    init_tracing();
    NetworkService::new(Arc::new(MemoryStore::new()))
}

fn admin() -> Principal {
    Principal::superuser("admin")
}

fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

fn new_node(
    name: &str,
    node_type: NodeType,
    supplier_id: Option<Uuid>,
    email: &str,
) -> NewNetworkNode {
    NewNetworkNode {
        name: name.into(),
        node_type,
        supplier_id,
        email: email.into(),
        phone: None,
        country: "Russia".into(),
        city: "Moscow".into(),
        street: "Tverskaya".into(),
        house_number: "1".into(),
        postal_code: None,
        product_ids: Vec::new(),
    }
}

async fn seed_employee(
    service: &NetworkService<MemoryStore>,
    username: &str,
    department: &str,
    active: bool,
) -> Employee {
    let employee = service
        .register_employee(
            &admin(),
            NewEmployee {
                username: username.into(),
                full_name: format!("{username} full"),
                email: format!("{username}@example.com"),
                department: department.into(),
                position: "Specialist".into(),
            },
        )
        .await
        .expect("employee registered");
    if !active {
        service
            .deactivate_employee(&admin(), employee.id)
            .await
            .expect("deactivated")
    } else {
        employee
    }
}

/// Factory -> retail -> entrepreneur chain resolves levels 0, 1, 2.
#[tokio::test]
async fn supply_chain_levels_follow_the_supplier_chain() {
    let service = service();
    let admin = admin();

    let factory = service
        .create_node(
            &admin,
            new_node("Factory F", NodeType::Factory, None, "f@example.com"),
        )
        .await
        .unwrap();
    let retail = service
        .create_node(
            &admin,
            new_node(
                "Retail R",
                NodeType::RetailNetwork,
                Some(factory.node.id),
                "r@example.com",
            ),
        )
        .await
        .unwrap();
    let entrepreneur = service
        .create_node(
            &admin,
            new_node(
                "Entrepreneur E",
                NodeType::IndividualEntrepreneur,
                Some(retail.node.id),
                "e@example.com",
            ),
        )
        .await
        .unwrap();

    assert_eq!(factory.level, 0);
    assert_eq!(retail.level, 1);
    assert_eq!(entrepreneur.level, 2);
    assert_eq!(retail.supplier_name.as_deref(), Some("Factory F"));

    assert_eq!(service.get_level(&admin, factory.node.id).await.unwrap(), 0);
    assert_eq!(service.get_level(&admin, retail.node.id).await.unwrap(), 1);
    assert_eq!(
        service.get_level(&admin, entrepreneur.node.id).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn factory_with_supplier_is_rejected_on_create_and_update() {
    let service = service();
    let admin = admin();

    let factory = service
        .create_node(
            &admin,
            new_node("Factory F", NodeType::Factory, None, "f@example.com"),
        )
        .await
        .unwrap();

    let err = service
        .create_node(
            &admin,
            new_node(
                "Factory G",
                NodeType::Factory,
                Some(factory.node.id),
                "g@example.com",
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Hierarchy(HierarchyError::InvalidSupplierForFactory)
    ));

    // Retyping a supplied node into a factory must fail the same way.
    let retail = service
        .create_node(
            &admin,
            new_node(
                "Retail R",
                NodeType::RetailNetwork,
                Some(factory.node.id),
                "r@example.com",
            ),
        )
        .await
        .unwrap();
    let err = service
        .update_node(
            &admin,
            retail.node.id,
            NetworkNodeUpdate {
                node_type: Some(NodeType::Factory),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Hierarchy(HierarchyError::InvalidSupplierForFactory)
    ));
}

#[tokio::test]
async fn reassigning_a_descendant_as_supplier_is_a_cycle() {
    let service = service();
    let admin = admin();

    let retail = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "r@example.com"),
        )
        .await
        .unwrap();
    let entrepreneur = service
        .create_node(
            &admin,
            new_node(
                "Entrepreneur E",
                NodeType::IndividualEntrepreneur,
                Some(retail.node.id),
                "e@example.com",
            ),
        )
        .await
        .unwrap();

    // E already buys from R; R buying from E closes the loop.
    let err = service
        .update_node(
            &admin,
            retail.node.id,
            NetworkNodeUpdate {
                supplier_id: Some(Some(entrepreneur.node.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Hierarchy(HierarchyError::CyclicSupplierChain { node_id })
            if node_id == retail.node.id
    ));

    let err = service
        .update_node(
            &admin,
            retail.node.id,
            NetworkNodeUpdate {
                supplier_id: Some(Some(retail.node.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Hierarchy(HierarchyError::CyclicSupplierChain { .. })
    ));
}

#[tokio::test]
async fn create_ignores_debt_in_raw_payload() {
    let service = service();
    let admin = admin();

    let raw = serde_json::json!({
        "name": "Retail R",
        "node_type": "retail_network",
        "email": "r@example.com",
        "country": "Russia",
        "city": "Moscow",
        "street": "Arbat",
        "house_number": "10",
        "debt": "99999.99"
    });
    let new: NewNetworkNode = serde_json::from_value(raw).unwrap();
    let created = service.create_node(&admin, new).await.unwrap();
    assert_eq!(created.node.debt, Decimal::ZERO);
}

#[tokio::test]
async fn update_with_debt_key_fails_regardless_of_value() {
    let service = service();
    let admin = admin();

    let node = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "r@example.com"),
        )
        .await
        .unwrap();

    // Even an unchanged value ("0.00") must be rejected.
    for raw in [
        serde_json::json!({ "debt": "0.00" }),
        serde_json::json!({ "debt": null }),
        serde_json::json!({ "name": "Renamed", "debt": "10.00" }),
    ] {
        let update: NetworkNodeUpdate = serde_json::from_value(raw).unwrap();
        let err = service
            .update_node(&admin, node.node.id, update)
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::DebtFieldImmutable));
    }

    // Nothing was applied along the way.
    let fetched = service.get_node(&admin, node.node.id).await.unwrap();
    assert_eq!(fetched.node.name, "Retail R");
    assert_eq!(fetched.node.debt, Decimal::ZERO);
}

#[tokio::test]
async fn clear_debt_reports_prior_value_and_zeroes_the_node() {
    let service = service();
    let admin = admin();

    let node = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "r@example.com"),
        )
        .await
        .unwrap();
    service
        .set_debt(&admin, node.node.id, dec("50000.00"))
        .await
        .unwrap();

    let cleared = service.clear_debt(&admin, node.node.id).await.unwrap();
    assert_eq!(cleared.old_debt, dec("50000.00"));
    assert_eq!(cleared.new_debt, Decimal::ZERO);

    let fetched = service.get_node(&admin, node.node.id).await.unwrap();
    assert_eq!(fetched.node.debt, Decimal::ZERO);
}

#[tokio::test]
async fn bulk_clear_debt_reports_count_and_sum() {
    let service = service();
    let admin = admin();

    let retail = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "r@example.com"),
        )
        .await
        .unwrap();
    service
        .set_debt(&admin, retail.node.id, dec("50000.00"))
        .await
        .unwrap();

    let unknown = Uuid::new_v4();
    let cleared = service
        .bulk_clear_debt(&admin, &[retail.node.id, unknown])
        .await
        .unwrap();
    assert_eq!(cleared.cleared_count, 1);
    assert_eq!(cleared.total_debt_cleared, dec("50000.00"));

    let fetched = service.get_node(&admin, retail.node.id).await.unwrap();
    assert_eq!(fetched.node.debt, dec("0.00"));
}

#[tokio::test]
async fn negative_debt_is_rejected_on_backend_adjustment() {
    let service = service();
    let admin = admin();
    let node = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "r@example.com"),
        )
        .await
        .unwrap();
    let err = service
        .set_debt(&admin, node.node.id, dec("-1.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::NegativeDebt { .. }));
}

#[tokio::test]
async fn deleting_a_supplier_detaches_dependents() {
    let service = service();
    let admin = admin();

    let factory = service
        .create_node(
            &admin,
            new_node("Factory F", NodeType::Factory, None, "f@example.com"),
        )
        .await
        .unwrap();
    let retail = service
        .create_node(
            &admin,
            new_node(
                "Retail R",
                NodeType::RetailNetwork,
                Some(factory.node.id),
                "r@example.com",
            ),
        )
        .await
        .unwrap();

    service.delete_node(&admin, factory.node.id).await.unwrap();

    // The dependent survives with its supplier cleared and its level
    // recomputed from the new shape.
    let fetched = service.get_node(&admin, retail.node.id).await.unwrap();
    assert_eq!(fetched.node.supplier_id, None);
    assert_eq!(fetched.level, 0);
    assert_eq!(fetched.supplier_name, None);
}

#[tokio::test]
async fn duplicate_emails_are_rejected() {
    let service = service();
    let admin = admin();

    service
        .create_node(
            &admin,
            new_node("Factory F", NodeType::Factory, None, "same@example.com"),
        )
        .await
        .unwrap();
    let err = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "same@example.com"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::DuplicateEmail { .. }));

    let other = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "other@example.com"),
        )
        .await
        .unwrap();
    let err = service
        .update_node(
            &admin,
            other.node.id,
            NetworkNodeUpdate {
                email: Some("same@example.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::DuplicateEmail { .. }));
}

#[tokio::test]
async fn invalid_phone_is_rejected_before_any_write() {
    let service = service();
    let admin = admin();

    let mut new = new_node("Factory F", NodeType::Factory, None, "f@example.com");
    new.phone = Some("not-a-phone".into());
    let err = service.create_node(&admin, new).await.unwrap_err();
    assert!(matches!(err, NetworkError::InvalidPhone { .. }));
    assert!(service.list_nodes(&admin).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_product_name_and_model_is_rejected() {
    let service = service();
    let admin = admin();

    let release_date = chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
    service
        .create_product(
            &admin,
            NewProduct {
                name: "Router".into(),
                model: "RX-100".into(),
                release_date,
                description: None,
                price: Some(dec("199.99")),
            },
        )
        .await
        .unwrap();

    let err = service
        .create_product(
            &admin,
            NewProduct {
                name: "Router".into(),
                model: "RX-100".into(),
                release_date,
                description: Some("same name and model".into()),
                price: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::DuplicateProduct { .. }));
}

#[tokio::test]
async fn deleting_a_product_unlinks_it_from_nodes() {
    let service = service();
    let admin = admin();

    let product = service
        .create_product(
            &admin,
            NewProduct {
                name: "Router".into(),
                model: "RX-100".into(),
                release_date: chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
                description: None,
                price: None,
            },
        )
        .await
        .unwrap();

    let mut new = new_node("Factory F", NodeType::Factory, None, "f@example.com");
    new.product_ids = vec![product.id];
    let node = service.create_node(&admin, new).await.unwrap();
    assert_eq!(node.products.len(), 1);

    service.delete_product(&admin, product.id).await.unwrap();
    let fetched = service.get_node(&admin, node.node.id).await.unwrap();
    assert!(fetched.node.product_ids.is_empty());
    assert!(fetched.products.is_empty());
}

#[tokio::test]
async fn product_assignment_round_trips_on_a_node() {
    let service = service();
    let admin = admin();

    let product = service
        .create_product(
            &admin,
            NewProduct {
                name: "Switch".into(),
                model: "SW-8".into(),
                release_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                description: None,
                price: None,
            },
        )
        .await
        .unwrap();
    let node = service
        .create_node(
            &admin,
            new_node("Factory F", NodeType::Factory, None, "f@example.com"),
        )
        .await
        .unwrap();

    let view = service
        .assign_product(&admin, node.node.id, product.id)
        .await
        .unwrap();
    assert_eq!(view.node.product_ids, vec![product.id]);
    assert_eq!(view.products[0].model, "SW-8");

    // Assigning again does not duplicate.
    let view = service
        .assign_product(&admin, node.node.id, product.id)
        .await
        .unwrap();
    assert_eq!(view.node.product_ids.len(), 1);

    let view = service
        .remove_product(&admin, node.node.id, product.id)
        .await
        .unwrap();
    assert!(view.node.product_ids.is_empty());
}

#[tokio::test]
async fn concurrent_assignments_to_one_node_both_persist() {
    let service = service();
    let admin = admin();

    let release_date = chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let mut product_ids = Vec::new();
    for model in ["SW-8", "SW-16"] {
        let product = service
            .create_product(
                &admin,
                NewProduct {
                    name: "Switch".into(),
                    model: model.into(),
                    release_date,
                    description: None,
                    price: None,
                },
            )
            .await
            .unwrap();
        product_ids.push(product.id);
    }
    let node = service
        .create_node(
            &admin,
            new_node("Factory F", NodeType::Factory, None, "f@example.com"),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for product_id in product_ids.clone() {
        let service = service.clone();
        let admin = admin.clone();
        let node_id = node.node.id;
        handles.push(tokio::spawn(async move {
            service.assign_product(&admin, node_id, product_id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let fetched = service.get_node(&admin, node.node.id).await.unwrap();
    assert_eq!(fetched.node.product_ids.len(), 2);
    for product_id in &product_ids {
        assert!(fetched.node.product_ids.contains(product_id));
    }
}

#[tokio::test]
async fn average_debt_rounds_midpoints_away_from_zero() {
    let service = service();
    let admin = admin();

    let first = service
        .create_node(
            &admin,
            new_node("Retail A", NodeType::RetailNetwork, None, "a@example.com"),
        )
        .await
        .unwrap();
    let second = service
        .create_node(
            &admin,
            new_node("Retail B", NodeType::RetailNetwork, None, "b@example.com"),
        )
        .await
        .unwrap();
    service
        .set_debt(&admin, first.node.id, dec("10.02"))
        .await
        .unwrap();
    service
        .set_debt(&admin, second.node.id, dec("10.03"))
        .await
        .unwrap();

    // 10.025 rounds up, the way SQL round() does.
    let summary = service.network_summary(&admin).await.unwrap();
    assert_eq!(summary.average_debt, dec("10.03"));
}

#[tokio::test]
async fn deactivated_employee_is_denied_every_operation() {
    let service = service();
    seed_employee(&service, "worker", "Administration", false).await;
    let worker = Principal::user("worker");

    let err = service
        .create_node(
            &worker,
            new_node("Factory F", NodeType::Factory, None, "f@example.com"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::AccountDeactivated { .. })
    ));

    let err = service.list_nodes(&worker).await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::AccountDeactivated { .. })
    ));
}

#[tokio::test]
async fn principal_without_profile_is_denied() {
    let service = service();
    let ghost = Principal::user("ghost");
    let err = service.list_nodes(&ghost).await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::NoProfile { .. })
    ));
}

#[tokio::test]
async fn sales_can_write_but_not_delete() {
    let service = service();
    let admin = admin();
    seed_employee(&service, "seller", "Sales", true).await;
    let seller = Principal::user("seller");

    let node = service
        .create_node(
            &seller,
            new_node("Retail R", NodeType::RetailNetwork, None, "r@example.com"),
        )
        .await
        .unwrap();
    service
        .update_node(
            &seller,
            node.node.id,
            NetworkNodeUpdate {
                name: Some("Retail R2".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = service.delete_node(&seller, node.node.id).await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::InsufficientDepartment { .. })
    ));

    // The admin can.
    service.delete_node(&admin, node.node.id).await.unwrap();
}

#[tokio::test]
async fn analytics_is_read_only() {
    let service = service();
    let admin = admin();
    seed_employee(&service, "analyst", "Analytics", true).await;
    let analyst = Principal::user("analyst");

    let node = service
        .create_node(
            &admin,
            new_node("Retail R", NodeType::RetailNetwork, None, "r@example.com"),
        )
        .await
        .unwrap();

    assert!(service.list_nodes(&analyst).await.is_ok());
    assert!(service.network_summary(&analyst).await.is_ok());

    let err = service
        .create_node(
            &analyst,
            new_node("Retail X", NodeType::RetailNetwork, None, "x@example.com"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::InsufficientDepartment { .. })
    ));
    let err = service.clear_debt(&analyst, node.node.id).await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::InsufficientDepartment { .. })
    ));
}

#[tokio::test]
async fn authenticate_touches_last_login_but_authorize_does_not() {
    let service = service();
    seed_employee(&service, "worker", "Sales", true).await;
    let worker = Principal::user("worker");

    assert_eq!(
        service.current_employee(&worker).await.unwrap().last_login,
        None
    );

    // Plain permission checks never write.
    service.authorize(&worker, Operation::Read).await.unwrap();
    assert_eq!(
        service.current_employee(&worker).await.unwrap().last_login,
        None
    );

    let authenticated = service.authenticate(&worker).await.unwrap();
    assert!(authenticated.last_login.is_some());
    assert!(service
        .current_employee(&worker)
        .await
        .unwrap()
        .last_login
        .is_some());
}

#[tokio::test]
async fn deactivated_employee_cannot_authenticate() {
    let service = service();
    seed_employee(&service, "worker", "Sales", false).await;
    let err = service
        .authenticate(&Principal::user("worker"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::AccountDeactivated { .. })
    ));
}

#[tokio::test]
async fn network_summary_aggregates_the_whole_network() {
    let service = service();
    let admin = admin();

    let factory = service
        .create_node(
            &admin,
            new_node("Factory F", NodeType::Factory, None, "f@example.com"),
        )
        .await
        .unwrap();
    let retail = service
        .create_node(
            &admin,
            new_node(
                "Retail R",
                NodeType::RetailNetwork,
                Some(factory.node.id),
                "r@example.com",
            ),
        )
        .await
        .unwrap();
    let mut entrepreneur = new_node(
        "Entrepreneur E",
        NodeType::IndividualEntrepreneur,
        Some(retail.node.id),
        "e@example.com",
    );
    entrepreneur.country = "Kazakhstan".into();
    service.create_node(&admin, entrepreneur).await.unwrap();
    service
        .set_debt(&admin, retail.node.id, dec("100.00"))
        .await
        .unwrap();

    let summary = service.network_summary(&admin).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.factories, 1);
    assert_eq!(summary.retail_networks, 1);
    assert_eq!(summary.entrepreneurs, 1);
    assert_eq!(summary.total_debt, dec("100.00"));
    assert_eq!(summary.average_debt, dec("33.33"));
    assert_eq!(summary.with_supplier, 2);
    assert_eq!(summary.without_supplier, 1);
    assert_eq!(summary.by_country.len(), 2);
    assert_eq!(summary.by_country[0].country, "Russia");
    assert_eq!(summary.by_country[0].count, 2);
}

#[tokio::test]
async fn employee_management_is_gated_and_activation_round_trips() {
    let service = service();
    let admin = admin();
    let employee = seed_employee(&service, "worker", "Sales", true).await;

    // A regular employee cannot manage employees, even from sales.
    let worker = Principal::user("worker");
    let err = service.list_employees(&worker).await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Access(AccessDenied::InsufficientDepartment { .. })
    ));

    let deactivated = service
        .deactivate_employee(&admin, employee.id)
        .await
        .unwrap();
    assert!(!deactivated.is_active);
    let reactivated = service.activate_employee(&admin, employee.id).await.unwrap();
    assert!(reactivated.is_active);

    let err = service
        .register_employee(
            &admin,
            NewEmployee {
                username: "worker".into(),
                full_name: "Duplicate".into(),
                email: "dup@example.com".into(),
                department: "Sales".into(),
                position: "Specialist".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::DuplicateUsername { .. }));
}

#[tokio::test]
async fn unknown_node_lookups_surface_not_found() {
    let service = service();
    let admin = admin();
    let id = Uuid::new_v4();

    assert!(matches!(
        service.get_node(&admin, id).await.unwrap_err(),
        NetworkError::NotFound { .. }
    ));
    assert!(matches!(
        service.get_level(&admin, id).await.unwrap_err(),
        NetworkError::NotFound { .. }
    ));
    assert!(matches!(
        service.clear_debt(&admin, id).await.unwrap_err(),
        NetworkError::NotFound { .. }
    ));
    assert!(matches!(
        service.delete_node(&admin, id).await.unwrap_err(),
        NetworkError::NotFound { .. }
    ));
}
