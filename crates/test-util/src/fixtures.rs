//! Type trees shared by the analyzer test suites.

use gotmpl_check_types::TypeNode;

fn s(name: &str) -> TypeNode {
    TypeNode::scalar(name, "string")
}

fn int(name: &str) -> TypeNode {
    TypeNode::scalar(name, "int")
}

/// `{Drugs: []Drug{Name string}}`
#[must_use]
pub fn drugs() -> TypeNode {
    TypeNode::root([TypeNode::slice(
        "Drugs",
        TypeNode::structure("", "Drug", [s("Name")]),
    )])
}

/// `{User: User{Age int}}`
#[must_use]
pub fn user() -> TypeNode {
    TypeNode::root([TypeNode::structure("User", "User", [int("Age")])])
}

fn member() -> TypeNode {
    TypeNode::structure(
        "",
        "Member",
        [
            s("Name"),
            s("Email"),
            TypeNode::slice("Tags", TypeNode::scalar("", "string")),
        ],
    )
}

fn team() -> TypeNode {
    TypeNode::structure(
        "",
        "Team",
        [s("Name"), TypeNode::slice("Members", member())],
    )
}

fn department() -> TypeNode {
    TypeNode::structure(
        "",
        "Department",
        [s("Name"), TypeNode::slice("Teams", team())],
    )
}

/// A company with three levels of nested slices plus assorted scalars,
/// maps and an `interface{}` field.
#[must_use]
pub fn company() -> TypeNode {
    let item = TypeNode::structure(
        "",
        "Item",
        [
            s("Name"),
            TypeNode::scalar("Price", "float64"),
            int("Qty"),
        ],
    );
    let role = TypeNode::structure("", "Role", [s("Title")]);
    let user = TypeNode::structure(
        "",
        "User",
        [
            s("Name"),
            int("Age"),
            TypeNode::map("Roles", TypeNode::scalar("", "string"), role),
        ],
    );
    TypeNode::root([
        TypeNode::structure(
            "Company",
            "Company",
            [s("Name"), TypeNode::slice("Departments", department())],
        ),
        TypeNode::slice("Items", item),
        TypeNode::slice("Users", user),
        int("Count"),
        s("Title"),
        TypeNode::map(
            "Meta",
            TypeNode::scalar("", "string"),
            TypeNode::scalar("", "string"),
        ),
        TypeNode::scalar("Extra", "interface{}"),
    ])
}
